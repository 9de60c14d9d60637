pub mod access_info;
pub mod log_view;
pub mod server_controls;
