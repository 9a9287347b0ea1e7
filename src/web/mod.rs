pub mod app_state;
pub mod champions;
pub mod rest_api;
pub mod router;
