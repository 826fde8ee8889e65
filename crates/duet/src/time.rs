use chrono::{DateTime, Local};

/// Returns the current local time as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp() -> String {
    format_timestamp(&Local::now())
}

/// Returns the current local time as `HH:MM:SS`.
pub fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Returns a compact stamp for archived file names, `YYYYmmdd-HHMMSS`.
pub fn file_stamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
