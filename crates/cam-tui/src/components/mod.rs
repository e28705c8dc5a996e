pub mod bitrate_picker;
pub mod device_panel;
pub mod endpoint_bar;
pub mod help_overlay;
pub mod log_panel;
