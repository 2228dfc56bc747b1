//! Pure text helpers composed by every extraction strategy.
//!
//! Nothing in here touches the vault: each function maps text (and offsets
//! into it) to text.

pub mod clean;
pub mod embeds;
pub mod markers;
pub mod mentions;
pub mod window;

pub use clean::{clean, strip_code_fences, strip_header, strip_hyperlinks};
pub use embeds::{resolve_embeds, select_fragment, strip_block_anchors, ResolvedEmbed};
pub use markers::{
    substitute, to_markers, HashMarkers, MarkedText, MarkerGenerator, MarkerRegistry,
    RandomMarkers,
};
pub use mentions::{find_mentions, scan_embeds, scan_metadata};
pub use window::{extract_windows, windows_for_entity};
