mod prescan;
mod scan;
mod source;
mod text;

pub use prescan::{scan_jump_bases, JumpBases};
pub use scan::is_whitespace;
pub use source::{strip_comments, ScriptBuffer, FILE_END};
pub use text::{apply_escapes, is_visible, normalize_whitespace, wrap_text};
