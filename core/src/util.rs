//! Small standalone utilities with no natural home elsewhere.

/// Runs a closure when dropped, regardless of whether the scope exited
/// normally or via an early return/`?`. Used to clean up partial output
/// (temp files, in-progress chunk directories) on transform failure
/// without threading cleanup through every error path by hand.
///
/// ```
/// # use ingest_core::util::Finally;
/// let mut cleaned = false;
/// {
///     let _guard = Finally::new(|| cleaned = true);
/// }
/// assert!(cleaned);
/// ```
pub struct Finally<F: FnMut()> {
    f: F,
    armed: bool,
}

impl<F: FnMut()> Finally<F> {
    pub fn new(f: F) -> Self {
        Self { f, armed: true }
    }

    /// Disarms the guard, so its closure does not run on drop. Call this
    /// once the operation it was guarding has succeeded.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<F: FnMut()> Drop for Finally<F> {
    fn drop(&mut self) {
        if self.armed {
            (self.f)();
        }
    }
}

/// Validates a client-supplied filename (from the `Filename` header, a
/// multipart field name, or a resumable's filename path segment).
/// Rejects empty names, `.`/`..`, any path separator (a filename is never
/// allowed to smuggle a directory component — this is stricter than
/// "basename-strip-then-allow", which would let `/bin/bash -c` through
/// as `bash -c`), and anything outside a conservative character
/// whitelist.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "." || raw == ".." || raw.contains("..") {
        return None;
    }
    if raw.contains('/') || raw.contains('\\') {
        return None;
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ');
    if !raw.chars().all(allowed) {
        return None;
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finally_runs_on_normal_drop() {
        let mut ran = false;
        {
            let _g = Finally::new(|| ran = true);
        }
        assert!(ran);
    }

    #[test]
    fn finally_skips_when_disarmed() {
        let mut ran = false;
        {
            let mut g = Finally::new(|| ran = true);
            g.disarm();
        }
        assert!(!ran);
    }

    #[test]
    fn sanitize_accepts_plain_names() {
        assert_eq!(sanitize_filename("c.csv").as_deref(), Some("c.csv"));
        assert_eq!(sanitize_filename("streamed-put-example.csv").as_deref(), Some("streamed-put-example.csv"));
    }

    #[test]
    fn sanitize_rejects_path_safety_cases() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("~!@#$%"), None);
        assert_eq!(sanitize_filename("../../etc/passwd"), None);
        assert_eq!(sanitize_filename("/bin/bash -c"), None);
    }
}
