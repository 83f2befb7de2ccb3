pub mod questions;
pub mod submissions;
pub mod subscales;
pub mod users;
