// ── Best-effort traffic heuristics ──
//
// The controller has no dedicated "version reported" event; a version
// answer is recognised from the decoded text or raw bytes of received
// traffic and answered with a registry refresh.

/// Decoded-text markers of a command station version reply.
const VERSION_TEXT_MARKERS: [&str; 2] = ["Software Version", "CS Version"];

/// XpressNet "command station software version" reply header bytes.
const VERSION_HEX_MARKER: &str = "63 21";

/// Does a received message look like a command station version reply?
///
/// `decoded` is the decoded text (or raw message when nothing decoded) and
/// `hex` the space-separated byte dump. Without decoded text nothing
/// matches, the hex marker included.
pub fn looks_like_version_report(decoded: &str, hex: &str) -> bool {
    if decoded.is_empty() {
        return false;
    }
    VERSION_TEXT_MARKERS.iter().any(|m| decoded.contains(m)) || hex.contains(VERSION_HEX_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_text_matches() {
        assert!(looks_like_version_report("Software Version 3.6", ""));
        assert!(looks_like_version_report("DCC-EX CS Version 5.0", ""));
        assert!(!looks_like_version_report("Track power on", "61 01 60"));
    }

    #[test]
    fn hex_marker_needs_decoded_text() {
        assert!(looks_like_version_report("63 21 36 00 74", "63 21 36 00 74"));
        assert!(!looks_like_version_report("", "63 21 36 00 74"));
    }
}
