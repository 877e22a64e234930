//! Small shared helpers.

/// Extracts a printable message from a caught panic payload.
///
/// Used wherever the core contains a callback panic (timer fires, scene
/// lifecycle hooks) so the log line carries the original message instead
/// of `Any`.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
