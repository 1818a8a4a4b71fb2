use chrono::Local;
use rand::Rng;
use std::path::Path;

/// Extensions accepted for upload. Everything else is rejected before the
/// bytes are even looked at.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Returns the lower-cased extension of `filename` if it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

/// Allocates a collision-resistant local name for an accepted upload:
/// `<dd_mm_yy_HH_MM_SS>_<4-digit>.<ext>`.
///
/// Only the extension of the original filename is trusted. Uniqueness is
/// probabilistic (1 in 10,000 per second); a collision overwrites the same
/// remote slot and is tolerated, since the remote store keys solely on path.
pub fn allocate_name(original_filename: &str) -> Option<String> {
    let ext = allowed_extension(original_filename)?;
    let timestamp = Local::now().format("%d_%m_%y_%H_%M_%S");
    let code: u32 = rand::thread_rng().gen_range(0..10_000);
    Some(format!("{timestamp}_{code:04}.{ext}"))
}
