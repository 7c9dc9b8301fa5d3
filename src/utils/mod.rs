pub mod constants;
pub mod db_connect;
pub mod env;
pub mod instantiate_run;
pub mod progress;
