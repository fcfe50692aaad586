//! Streaming HTML attribute rewriter.
//!
//! Relative `a[href]`, `img[src]`, `link[href]` and `script[src]` values
//! are resolved against the proxied page's URL so assets load from the
//! original site. Values that are already absolute (`http...`) or
//! protocol-relative (`//...`) are left alone, as are values that do not
//! resolve.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use lol_html::errors::RewritingError;
use lol_html::{element, ElementContentHandlers, HtmlRewriter, Selector, Settings};
use std::borrow::Cow;
use std::fmt::Display;
use std::io;
use tokio::sync::mpsc;
use url::Url;

/// Element/attribute pairs that get rewritten.
pub const REWRITE_TARGETS: [(&str, &str); 4] = [
    ("a", "href"),
    ("img", "src"),
    ("link", "href"),
    ("script", "src"),
];

/// Chunks buffered between the fetch and the rewriter, in each direction.
const CHANNEL_CAPACITY: usize = 16;

/// Resolves an attribute value against `base`. Returns `None` when the
/// value must be left unchanged.
pub fn resolve_attribute(value: &str, base: &Url) -> Option<String> {
    if value.starts_with("http") || value.starts_with("//") {
        return None;
    }
    match base.join(value) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(e) => {
            tracing::debug!("Leaving '{}' unresolved: {}", value, e);
            None
        }
    }
}

fn attribute_handlers(
    base: &Url,
) -> Vec<(Cow<'static, Selector>, ElementContentHandlers<'static>)> {
    REWRITE_TARGETS
        .iter()
        .map(|&(tag, attribute)| {
            let base = base.clone();
            let selector = format!("{}[{}]", tag, attribute);
            element!(selector, move |el| {
                if let Some(value) = el.get_attribute(attribute) {
                    if let Some(resolved) = resolve_attribute(&value, &base) {
                        el.set_attribute(attribute, &resolved)?;
                    }
                }
                Ok(())
            })
        })
        .collect()
}

/// Rewrites a complete document in memory.
pub fn rewrite_html(html: &[u8], base: &Url) -> Result<Vec<u8>, RewritingError> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: attribute_handlers(base),
            ..Settings::new()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );
    rewriter.write(html)?;
    rewriter.end()?;
    Ok(output)
}

/// Rewrites `upstream` chunk by chunk without collecting the whole body.
///
/// The rewriter runs on the blocking pool and is fed through bounded
/// channels, so a slow client slows the upstream read. An upstream error
/// ends the stream with that error.
pub fn rewrite_stream<S, E>(upstream: S, base: Url) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (input_tx, mut input_rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut upstream = Box::pin(upstream);
        while let Some(item) = upstream.next().await {
            let item = item.map_err(|e| io::Error::other(e.to_string()));
            let failed = item.is_err();
            if input_tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });

    tokio::task::spawn_blocking(move || {
        let sink = output_tx.clone();
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: attribute_handlers(&base),
                ..Settings::new()
            },
            move |chunk: &[u8]| {
                if !chunk.is_empty() {
                    // A closed receiver means the client went away.
                    let _ = sink.blocking_send(Ok(Bytes::copy_from_slice(chunk)));
                }
            },
        );

        while let Some(item) = input_rx.blocking_recv() {
            let result = item.and_then(|chunk| rewriter.write(&chunk).map_err(io::Error::other));
            if let Err(e) = result {
                tracing::warn!("Rewrite of {} aborted: {}", base, e);
                let _ = output_tx.blocking_send(Err(e));
                return;
            }
        }
        if let Err(e) = rewriter.end() {
            let _ = output_tx.blocking_send(Err(io::Error::other(e)));
        }
    });

    futures::stream::unfold(output_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
