use objc2_app_kit::{NSPasteboard, NSPasteboardTypeString};
use objc2_foundation::NSString;
use tracing::debug;

/// Read the general pasteboard as plain text.
///
/// Returns `None` when the pasteboard is empty or holds no string type.
#[must_use]
#[allow(unsafe_code)]
pub fn read_text() -> Option<String> {
    // SAFETY: NSPasteboard is thread-safe for these accessors; the type
    // constant is a static NSString.
    let text = unsafe {
        let pasteboard = NSPasteboard::generalPasteboard();
        pasteboard.stringForType(NSPasteboardTypeString)
    };
    let text = text.map(|s| s.to_string())?;
    debug!(text_len = text.len(), "read pasteboard text");
    Some(text)
}

/// Replace the general pasteboard contents with `text`.
///
/// Returns false when AppKit rejects the write.
#[allow(unsafe_code)]
pub fn write_text(text: &str) -> bool {
    let string = NSString::from_str(text);
    // SAFETY: same as read_text; clearContents must precede setString.
    let ok = unsafe {
        let pasteboard = NSPasteboard::generalPasteboard();
        pasteboard.clearContents();
        pasteboard.setString_forType(&string, NSPasteboardTypeString)
    };
    debug!(text_len = text.len(), ok, "wrote pasteboard text");
    ok
}
