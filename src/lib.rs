// Live quiz client: session engine and console shell

pub mod client;
pub mod core;
