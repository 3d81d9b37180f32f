//! Enum wrappers for remote service dispatch.
//!
//! Same pattern as the hardware devices: native async traits are not
//! object-safe, so the runtime holds these concrete enums instead of trait
//! objects.

use crate::error::Result;
use crate::mock::{MockAuthorizationSource, MockLogSink};
use crate::sheet::HttpSheetClient;
use crate::traits::{AuthorizationSource, LogRow, LogSink};

/// Any supported authorization source.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyAuthorizationSource {
    Http(HttpSheetClient),
    Mock(MockAuthorizationSource),
}

impl AuthorizationSource for AnyAuthorizationSource {
    async fn fetch_authorized(&self) -> Result<Vec<String>> {
        match self {
            Self::Http(client) => client.fetch_authorized().await,
            Self::Mock(source) => source.fetch_authorized().await,
        }
    }
}

impl From<HttpSheetClient> for AnyAuthorizationSource {
    fn from(client: HttpSheetClient) -> Self {
        Self::Http(client)
    }
}

impl From<MockAuthorizationSource> for AnyAuthorizationSource {
    fn from(source: MockAuthorizationSource) -> Self {
        Self::Mock(source)
    }
}

/// Any supported remote log sink.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLogSink {
    Http(HttpSheetClient),
    Mock(MockLogSink),
}

impl LogSink for AnyLogSink {
    async fn append_row(&self, row: &LogRow) -> Result<()> {
        match self {
            Self::Http(client) => client.append_row(row).await,
            Self::Mock(sink) => sink.append_row(row).await,
        }
    }
}

impl From<HttpSheetClient> for AnyLogSink {
    fn from(client: HttpSheetClient) -> Self {
        Self::Http(client)
    }
}

impl From<MockLogSink> for AnyLogSink {
    fn from(sink: MockLogSink) -> Self {
        Self::Mock(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_log_sink_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let (sink, _handle) = MockLogSink::new();
        let sink = AnyLogSink::from(sink);
        let row = LogRow {
            timestamp: String::new(),
            subject: String::new(),
            status: String::new(),
        };
        assert_send(sink.append_row(&row));
    }

    #[tokio::test]
    async fn test_any_source_dispatch() {
        let (source, handle) = MockAuthorizationSource::new();
        handle.set_badges(["x1"]);
        let source = AnyAuthorizationSource::from(source);
        assert_eq!(source.fetch_authorized().await.unwrap(), vec!["x1"]);
    }
}
