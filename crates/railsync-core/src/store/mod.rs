// ── Mirrored state store ──
//
// Concurrent entity storage with push-based change notification.

mod collection;
mod mirror;

pub use mirror::MirrorStore;
