use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::IMAGE_EXTENSIONS;

/// Escape text for interpolation into markup, attributes included.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `YYYY-MM-DD` (or an RFC 3339 timestamp) as `dd/mm/yyyy`.
/// Anything unparsable is returned unchanged.
#[must_use]
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.format("%d/%m/%Y").to_string();
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(trimmed) {
        return stamp.date_naive().format("%d/%m/%Y").to_string();
    }
    trimmed.to_string()
}

#[must_use]
pub fn format_time(at: NaiveDateTime) -> String {
    at.format("%H:%M:%S").to_string()
}

/// `30000` → `30s`, `60000` → `1min`, `90000` → `1.5min`.
#[must_use]
pub fn format_interval(interval_ms: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let ms = interval_ms as f64;
    if interval_ms >= 60_000 {
        format!("{}min", ms / 60_000.0)
    } else {
        format!("{}s", ms / 1000.0)
    }
}

#[must_use]
pub fn is_image_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Runs only the last of a burst of calls, `delay` after that call.
///
/// Called outside a tokio runtime, the call runs immediately.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            f();
            return;
        };

        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pending) = pending {
            pending.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_escape_html_markup() {
        assert_eq!(
            escape_html(r#"<img src="x" onerror='alert(1)'> & co"#),
            "&lt;img src=&quot;x&quot; onerror=&#39;alert(1)&#39;&gt; &amp; co"
        );
        assert_eq!(escape_html("Concluído"), "Concluído");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-07"), "07/03/2024");
        assert_eq!(format_date("2024-03-07T10:00:00-03:00"), "07/03/2024");
        assert_eq!(format_date(""), "");
        assert_eq!(format_date("amanhã"), "amanhã");
    }

    #[test]
    fn test_format_time() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(9, 5, 3))
            .unwrap();
        assert_eq!(format_time(at), "09:05:03");
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(30_000), "30s");
        assert_eq!(format_interval(1_500), "1.5s");
        assert_eq!(format_interval(60_000), "1min");
        assert_eq!(format_interval(90_000), "1.5min");
        assert_eq!(format_interval(300_000), "5min");
    }

    #[test]
    fn test_image_filename_matching() {
        assert!(is_image_filename("a.png"));
        assert!(is_image_filename("C.JPG"));
        assert!(is_image_filename("foto.final.WebP"));
        assert!(!is_image_filename("b.txt"));
        assert!(!is_image_filename("png"));
        assert!(!is_image_filename("relatorio.pdf"));
    }

    proptest! {
        #[test]
        fn prop_escaped_text_has_no_markup(text in ".*") {
            let escaped = escape_html(&text);
            prop_assert!(!escaped.contains('<'));
            prop_assert!(!escaped.contains('>'));
            prop_assert!(!escaped.contains('"'));
            prop_assert!(!escaped.contains('\''));
        }

        #[test]
        fn prop_plain_text_is_untouched(text in "[a-zA-Z0-9 çãéíóú]*") {
            prop_assert_eq!(escape_html(&text), text);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_runs_last_call_once() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let hits = Arc::clone(&hits);
            let last = Arc::clone(&last);
            debouncer.call(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_cancel_drops_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debouncer_built_before_runtime_still_debounces() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            for _ in 0..3 {
                let counter = Arc::clone(&hits);
                debouncer.call(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
            assert_eq!(hits.load(Ordering::SeqCst), 0);

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_debouncer_without_runtime_runs_inline() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
