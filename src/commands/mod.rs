pub mod audit;
pub mod server;
pub mod site;
