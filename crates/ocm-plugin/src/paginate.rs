//! Cursor pagination driver for list-style operations.

use std::future::Future;

use tracing::warn;

use crate::error::PluginResult;

/// One page of a list-style response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` or empty on the last page.
    pub next: Option<String>,
}

/// Fetch pages starting at `first_cursor` and hand each to `callback`.
///
/// The loop stops on the final page (no or empty cursor), on a callback
/// error, or when the plugin misbehaves: an empty page that still carries a
/// cursor, or a cursor equal to the one just sent.
///
/// # Errors
///
/// Propagates the first fetch or callback error.
pub async fn paginate<T, F, Fut, C>(
    first_cursor: String,
    mut fetch: F,
    mut callback: C,
) -> PluginResult<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = PluginResult<Page<T>>>,
    C: FnMut(Vec<T>) -> PluginResult<()>,
{
    let mut last = first_cursor;
    loop {
        let page = fetch(last.clone()).await?;
        let empty = page.items.is_empty();
        callback(page.items)?;

        let next = match page.next {
            Some(next) if !next.is_empty() => next,
            _ => return Ok(()),
        };
        if empty {
            warn!(
                cursor = %next,
                "Plugin returned an empty page with a continuation cursor, stopping"
            );
            return Ok(());
        }
        if next == last {
            warn!(cursor = %next, "Plugin repeated the cursor it was sent, stopping");
            return Ok(());
        }
        last = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use std::sync::{Arc, Mutex};

    /// Serves canned pages and records the cursors it was asked for.
    fn pages(
        responses: Vec<(Vec<&'static str>, Option<&'static str>)>,
    ) -> (
        Arc<Mutex<Vec<String>>>,
        impl FnMut(String) -> std::future::Ready<PluginResult<Page<String>>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let mut responses = responses.into_iter();
        let fetch = move |cursor: String| {
            recorder.lock().unwrap().push(cursor);
            let (items, next) = responses.next().expect("unexpected extra fetch");
            std::future::ready(Ok(Page {
                items: items.into_iter().map(String::from).collect(),
                next: next.map(String::from),
            }))
        };
        (seen, fetch)
    }

    #[tokio::test]
    async fn test_follows_cursors_until_empty() {
        let (seen, fetch) = pages(vec![
            (vec!["a", "b"], Some("A")),
            (vec!["c", "d"], Some("B")),
            (vec!["e"], Some("")),
        ]);
        let mut items = Vec::new();
        paginate(String::new(), fetch, |page| {
            items.extend(page);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["", "A", "B"]);
        assert_eq!(items, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_absent_header_is_final_page() {
        let (seen, fetch) = pages(vec![(vec!["a"], None)]);
        paginate(String::new(), fetch, |_| Ok(())).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_cursor_stops() {
        let (seen, fetch) = pages(vec![
            (vec!["a"], Some("A")),
            (vec!["b"], Some("A")),
        ]);
        let mut items = Vec::new();
        paginate(String::new(), fetch, |page| {
            items.extend(page);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_page_with_cursor_stops() {
        let (seen, fetch) = pages(vec![(vec![], Some("A"))]);
        paginate(String::new(), fetch, |_| Ok(())).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_callback_error_aborts() {
        let (seen, fetch) = pages(vec![(vec!["a"], Some("A"))]);
        let err = paginate(String::new(), fetch, |_| {
            Err(PluginError::Conversion("stop".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PluginError::Conversion(_)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let result = paginate(
            "A".to_string(),
            |_| std::future::ready(Err::<Page<String>, _>(PluginError::NotFound("gone".into()))),
            |_| Ok(()),
        )
        .await;
        assert!(matches!(result, Err(PluginError::NotFound(_))));
    }
}
