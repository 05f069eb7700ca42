//! Paging over HighLevel list endpoints
//!
//! Most list endpoints describe the next page in a `meta` object. The
//! conversation search and message history endpoints use their own cursors,
//! covered by [`PageStrategy::Conversations`] and [`PageStrategy::Messages`].

use crate::client::HighLevelClient;
use crate::error::Result;
use futures::Stream;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

/// How the next page is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// Follow `meta.nextPageUrl` while `meta.nextPage` is non-null
    Meta,
    /// Continue from the last item's `lastMessageDate` (requires `sortBy`)
    Conversations,
    /// Continue from `messages.lastMessageId` while `messages.nextPage` is true
    Messages,
}

/// Iterates over the pages of a list endpoint
#[derive(Debug)]
pub struct Cursor {
    client: HighLevelClient,
    path: String,
    params: Map<String, Value>,
    strategy: PageStrategy,
    headers: Option<HeaderMap>,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(
        client: HighLevelClient,
        path: &str,
        params: Map<String, Value>,
        strategy: PageStrategy,
    ) -> Self {
        Self {
            client,
            path: path.to_string(),
            params,
            strategy,
            headers: None,
            done: false,
        }
    }

    /// Headers of the most recently fetched page
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    /// Whether the last page has been fetched
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next page, `None` once there are no more items
    ///
    /// # Errors
    ///
    /// Propagates request and JSON errors; the cursor can be retried.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        let params = (!self.params.is_empty()).then(|| Value::Object(self.params.clone()));
        let response = self.client.get(&self.path, params.as_ref()).await?;
        let body: Value = response.json()?;
        self.headers = Some(response.headers);

        let items = match self.strategy {
            PageStrategy::Meta => self.advance_meta(&body),
            PageStrategy::Conversations => self.advance_conversations(&body),
            PageStrategy::Messages => self.advance_messages(&body),
        };

        if items.is_empty() {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(items))
    }

    /// Stream every item across all remaining pages
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Value>> {
        async_stream::try_stream! {
            while let Some(page) = self.next_page().await? {
                for item in page {
                    yield item;
                }
            }
        }
    }

    fn advance_meta(&mut self, body: &Value) -> Vec<Value> {
        let mut items = Vec::new();
        if let Some(object) = body.as_object() {
            for (key, value) in object {
                if key == "meta" {
                    continue;
                }
                // Scalars such as `traceId` and `total` are response metadata
                match value {
                    Value::Array(list) => items.extend(list.iter().cloned()),
                    Value::Object(_) => items.push(value.clone()),
                    _ => {}
                }
            }
        }

        let meta = body.get("meta");
        let has_next = meta
            .and_then(|m| m.get("nextPage"))
            .is_some_and(|n| !n.is_null());
        let next_url = meta
            .and_then(|m| m.get("nextPageUrl"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty());

        match (has_next, next_url) {
            (true, Some(url)) => {
                // The next page URL already carries the query
                self.path = url.to_string();
                self.params.clear();
            }
            _ => self.done = true,
        }
        items
    }

    fn advance_conversations(&mut self, body: &Value) -> Vec<Value> {
        let items = body
            .get("conversations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let sorted = self.params.get("sortBy").is_some_and(|v| !v.is_null());
        let last_date = items.last().and_then(|c| c.get("lastMessageDate")).cloned();

        match (sorted, last_date) {
            (true, Some(date)) if !date.is_null() => {
                self.params.insert("startAfterDate".to_string(), date);
            }
            _ => self.done = true,
        }
        items
    }

    fn advance_messages(&mut self, body: &Value) -> Vec<Value> {
        let Some(messages) = body.get("messages") else {
            self.done = true;
            return Vec::new();
        };

        let items = messages
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let has_next = messages
            .get("nextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match messages.get("lastMessageId").filter(|v| !v.is_null()) {
            Some(last_id) if has_next => {
                self.params
                    .insert("lastMessageId".to_string(), last_id.clone());
            }
            _ => self.done = true,
        }
        items
    }
}
