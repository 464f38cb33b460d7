//! # Chunked Upload Provider
//!
//! Resumable upload of large files through an upload session.
//!
//! ## Overview
//!
//! The service tracks which byte ranges of the file it still needs and
//! reports them as `nextExpectedRanges`. [`ChunkedUploadProvider`] turns
//! those ranges into fixed-size chunk requests, PUTs each chunk to the
//! session URL and re-reads the session status after every pass, so an
//! interrupted upload picks up at the first missing byte.
//!
//! Transient failures (transport errors, `generalException`, `timeout`,
//! `serviceNotAvailable`) are recorded and the chunk is resent on the next
//! pass. Anything else aborts the upload.
//!
//! ## Usage
//!
//! ```ignore
//! let session = client.create_upload_session(&parent, &descriptor).await?;
//! let file = tokio::fs::File::open("video.mp4").await?;
//! let mut upload = ChunkedUploadProvider::new(session, http_client, file, None).await?;
//!
//! let item = upload
//!     .upload(3, Some(&|p: UploadProgress| println!("{}/{}", p.bytes_uploaded, p.total_bytes)))
//!     .await?;
//! ```

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::{validate_chunk_size, DEFAULT_UPLOAD_CHUNK_SIZE};
use core_runtime::events::{EventBus, UploadEvent};
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{OneDriveError, Result};
use crate::types::{Item, UploadSession};

/// Default base delay between upload passes; the wait grows with the
/// square of the pass number.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// One PUT of a contiguous byte range. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadChunkRequest {
    pub range_start: u64,
    pub range_end: u64,
    pub total_length: u64,
}

impl UploadChunkRequest {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.range_end - self.range_start + 1
    }

    /// `Content-Range` header value, e.g. `bytes 0-327679/1000000`.
    pub fn content_range(&self) -> String {
        format!(
            "bytes {}-{}/{}",
            self.range_start, self.range_end, self.total_length
        )
    }
}

/// Bytes the service has acknowledged so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

/// Outcome of a chunk PUT or a session status query.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkUploadResult {
    /// The service assembled the file.
    Completed(Item),
    /// More ranges are expected.
    InProgress(UploadSession),
}

/// Progress callback passed to [`ChunkedUploadProvider::upload`].
pub type ProgressCallback<'a> = &'a (dyn Fn(UploadProgress) + Send + Sync);

/// Uploads one file into an upload session.
pub struct ChunkedUploadProvider<R> {
    session: UploadSession,
    http_client: Arc<dyn HttpClient>,
    source: R,
    total_length: u64,
    max_chunk_size: u64,
    event_bus: Option<EventBus>,
    upload_id: String,
    backoff_base: Duration,
    request_timeout: Option<Duration>,
}

impl<R> ChunkedUploadProvider<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// Create a provider for `session`.
    ///
    /// The source length is found by seeking to its end. `max_chunk_size`
    /// must be a positive multiple of 320 KiB; `None` uses 5 MiB.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad chunk size, an empty source or a session
    /// without an upload URL.
    pub async fn new(
        session: UploadSession,
        http_client: Arc<dyn HttpClient>,
        mut source: R,
        max_chunk_size: Option<u64>,
    ) -> Result<Self> {
        let max_chunk_size = max_chunk_size.unwrap_or(DEFAULT_UPLOAD_CHUNK_SIZE);
        validate_chunk_size(max_chunk_size)
            .map_err(|e| OneDriveError::InvalidArgument(e.to_string()))?;

        if session.upload_url.is_empty() {
            return Err(OneDriveError::InvalidArgument(
                "Upload session has no upload URL".to_string(),
            ));
        }

        let total_length = source.seek(SeekFrom::End(0)).await?;
        if total_length == 0 {
            return Err(OneDriveError::InvalidArgument(
                "Cannot upload an empty source through an upload session".to_string(),
            ));
        }
        source.seek(SeekFrom::Start(0)).await?;

        Ok(Self {
            session,
            http_client,
            source,
            total_length,
            max_chunk_size,
            event_bus: None,
            upload_id: Uuid::new_v4().to_string(),
            backoff_base: DEFAULT_BACKOFF_BASE,
            request_timeout: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Identifier used in upload events. Defaults to a random UUID.
    pub fn with_upload_id(mut self, upload_id: impl Into<String>) -> Self {
        self.upload_id = upload_id.into();
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Split the ranges the service still expects into chunk requests,
    /// in ascending order and no larger than the maximum chunk size.
    pub fn chunk_requests(&self) -> Result<Vec<UploadChunkRequest>> {
        let mut chunks = Vec::new();
        for (range_start, range_end) in self.expected_ranges()? {
            let mut chunk_start = range_start;
            while chunk_start <= range_end {
                let chunk_end = range_end.min(chunk_start.saturating_add(self.max_chunk_size - 1));
                chunks.push(UploadChunkRequest {
                    range_start: chunk_start,
                    range_end: chunk_end,
                    total_length: self.total_length,
                });
                chunk_start = chunk_end + 1;
            }
        }
        Ok(chunks)
    }

    /// Quadratic pause after pass `attempt`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt.saturating_mul(attempt))
    }

    /// Parsed `nextExpectedRanges`, sorted and checked against the source.
    fn expected_ranges(&self) -> Result<Vec<(u64, u64)>> {
        let mut ranges = self
            .session
            .next_expected_ranges
            .iter()
            .map(|range| parse_range(range, self.total_length))
            .collect::<Result<Vec<_>>>()?;
        ranges.sort_unstable();

        for pair in ranges.windows(2) {
            if pair[1].0 <= pair[0].1 {
                return Err(OneDriveError::InvalidRange(format!(
                    "Expected ranges {}-{} and {}-{} overlap",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                )));
            }
        }
        Ok(ranges)
    }

    /// Bytes acknowledged by the service: everything outside the
    /// remaining ranges.
    fn bytes_uploaded(&self) -> Option<u64> {
        let remaining: u64 = self
            .expected_ranges()
            .ok()?
            .iter()
            .map(|(start, end)| end - start + 1)
            .sum();
        Some(self.total_length.saturating_sub(remaining))
    }

    /// PUT one chunk to the session URL. No `Authorization` header is sent.
    #[instrument(skip(self), fields(upload_id = %self.upload_id))]
    pub async fn upload_chunk(&mut self, chunk: &UploadChunkRequest) -> Result<ChunkUploadResult> {
        let body = self.read_chunk(chunk).await?;

        let mut request = HttpRequest::new(HttpMethod::Put, self.session.upload_url.clone())
            .header("Content-Range", chunk.content_range())
            .header("Content-Length", chunk.len().to_string())
            .body(body);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await?;
        debug!(status = response.status, "Chunk response");

        match response.status {
            200 | 201 => Ok(ChunkUploadResult::Completed(serde_json::from_slice(
                &response.body,
            )?)),
            202 => {
                let session: UploadSession = serde_json::from_slice(&response.body)?;
                self.apply_session(session);
                Ok(ChunkUploadResult::InProgress(self.session.clone()))
            }
            _ => Err(OneDriveError::from_response(&response)),
        }
    }

    async fn read_chunk(&mut self, chunk: &UploadChunkRequest) -> Result<Bytes> {
        let len = usize::try_from(chunk.len()).map_err(|_| {
            OneDriveError::InvalidRange(format!("Chunk {} is too large", chunk.content_range()))
        })?;
        let mut buffer = vec![0u8; len];
        self.source.seek(SeekFrom::Start(chunk.range_start)).await?;
        self.source.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    /// Re-read the session from the service. A finished upload answers
    /// with the item.
    #[instrument(skip(self), fields(upload_id = %self.upload_id))]
    pub async fn update_session_status(&mut self) -> Result<ChunkUploadResult> {
        let mut request = HttpRequest::new(HttpMethod::Get, self.session.upload_url.clone());
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(OneDriveError::from_response(&response));
        }

        match parse_status(&response)? {
            ChunkUploadResult::Completed(item) => Ok(ChunkUploadResult::Completed(item)),
            ChunkUploadResult::InProgress(session) => {
                self.apply_session(session);
                Ok(ChunkUploadResult::InProgress(self.session.clone()))
            }
        }
    }

    /// Cancel the session on the service.
    #[instrument(skip(self), fields(upload_id = %self.upload_id))]
    pub async fn delete_session(&self) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Delete, self.session.upload_url.clone());
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(OneDriveError::from_response(&response));
        }
        info!("Upload session deleted");
        Ok(())
    }

    /// Upload every missing range, making at most `max_tries` passes.
    ///
    /// # Errors
    ///
    /// - A non-transient chunk or status error is returned as is.
    /// - `UploadFailed` when the passes run out, carrying every recorded
    ///   transient error.
    #[instrument(skip(self, progress), fields(upload_id = %self.upload_id, total = self.total_length))]
    pub async fn upload(
        &mut self,
        max_tries: u32,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<Item> {
        if max_tries == 0 {
            return Err(OneDriveError::InvalidArgument(
                "max_tries must be at least 1".to_string(),
            ));
        }

        info!("Starting chunked upload");
        self.emit(UploadEvent::Started {
            upload_id: self.upload_id.clone(),
            total_bytes: self.total_length,
        });
        self.report_progress(progress);

        let mut errors = Vec::new();
        for attempt in 1..=max_tries {
            let chunks = match self.chunk_requests() {
                Ok(chunks) => chunks,
                Err(e) => return Err(self.fail(attempt, e)),
            };
            debug!(attempt, chunks = chunks.len(), "Upload pass");

            for chunk in &chunks {
                match self.upload_chunk(chunk).await {
                    Ok(ChunkUploadResult::Completed(item)) => return Ok(self.complete(item, progress)),
                    Ok(ChunkUploadResult::InProgress(_)) => self.report_progress(progress),
                    Err(e) if e.is_transient_upload_error() => {
                        warn!(
                            attempt,
                            range = %chunk.content_range(),
                            error = %e,
                            "Chunk failed, will retry"
                        );
                        self.emit(UploadEvent::ChunkRetried {
                            upload_id: self.upload_id.clone(),
                            attempt,
                            range_start: chunk.range_start,
                            range_end: chunk.range_end,
                            message: e.to_string(),
                        });
                        errors.push(e);
                    }
                    Err(e) => return Err(self.fail(attempt, e)),
                }
            }

            match self.update_session_status().await {
                Ok(ChunkUploadResult::Completed(item)) => return Ok(self.complete(item, progress)),
                Ok(ChunkUploadResult::InProgress(session)) => {
                    if session.next_expected_ranges.is_empty() {
                        errors.push(OneDriveError::OperationFailed(
                            "Service expects no more ranges but has not returned the item"
                                .to_string(),
                        ));
                    }
                    self.report_progress(progress);
                }
                Err(e) if e.is_transient_upload_error() => {
                    warn!(attempt, error = %e, "Session status failed, will retry");
                    errors.push(e);
                }
                Err(e) => return Err(self.fail(attempt, e)),
            }

            if attempt < max_tries {
                let delay = self.backoff_delay(attempt);
                debug!(?delay, "Backing off before next pass");
                tokio::time::sleep(delay).await;
            }
        }

        warn!(attempts = max_tries, errors = errors.len(), "Upload gave up");
        Err(self.fail(
            max_tries,
            OneDriveError::UploadFailed {
                attempts: max_tries,
                errors,
            },
        ))
    }

    /// Adopt a session from the service, keeping our URL when it is omitted.
    fn apply_session(&mut self, mut session: UploadSession) {
        if session.upload_url.is_empty() {
            session.upload_url = std::mem::take(&mut self.session.upload_url);
        }
        if session.expiration_date_time.is_none() {
            session.expiration_date_time = self.session.expiration_date_time;
        }
        self.session = session;
    }

    fn report_progress(&self, progress: Option<ProgressCallback<'_>>) {
        if let Some(bytes_uploaded) = self.bytes_uploaded() {
            self.publish_progress(bytes_uploaded, progress);
        }
    }

    fn publish_progress(&self, bytes_uploaded: u64, progress: Option<ProgressCallback<'_>>) {
        if let Some(callback) = progress {
            callback(UploadProgress {
                bytes_uploaded,
                total_bytes: self.total_length,
            });
        }
        self.emit(UploadEvent::Progress {
            upload_id: self.upload_id.clone(),
            bytes_uploaded,
            total_bytes: self.total_length,
        });
    }

    fn complete(&self, item: Item, progress: Option<ProgressCallback<'_>>) -> Item {
        info!(item_id = %item.id, "Upload completed");
        self.publish_progress(self.total_length, progress);
        self.emit(UploadEvent::Completed {
            upload_id: self.upload_id.clone(),
            item_id: item.id.clone(),
            total_bytes: self.total_length,
        });
        item
    }

    fn fail(&self, attempts: u32, error: OneDriveError) -> OneDriveError {
        warn!(attempts, error = %error, "Upload failed");
        self.emit(UploadEvent::Failed {
            upload_id: self.upload_id.clone(),
            attempts,
            message: error.to_string(),
        });
        error
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }
}

/// Parse `"start-end"` or `"start-"` (open end means the last byte).
fn parse_range(range: &str, total_length: u64) -> Result<(u64, u64)> {
    let invalid = |reason: &str| OneDriveError::InvalidRange(format!("'{}': {}", range, reason));

    let (start, end) = range
        .trim()
        .split_once('-')
        .ok_or_else(|| invalid("missing '-'"))?;
    let start: u64 = start
        .trim()
        .parse()
        .map_err(|_| invalid("start is not a number"))?;
    let end: u64 = match end.trim() {
        "" => total_length
            .checked_sub(1)
            .ok_or_else(|| invalid("source is empty"))?,
        end => end.parse().map_err(|_| invalid("end is not a number"))?,
    };

    if end < start {
        return Err(invalid("end precedes start"));
    }
    if end >= total_length {
        return Err(invalid(&format!(
            "beyond source length {}",
            total_length
        )));
    }
    Ok((start, end))
}

/// Status responses are either the finished item or the session.
fn parse_status(response: &HttpResponse) -> Result<ChunkUploadResult> {
    let value: serde_json::Value = serde_json::from_slice(&response.body)?;
    if value.get("id").is_some() {
        Ok(ChunkUploadResult::Completed(serde_json::from_value(value)?))
    } else {
        Ok(ChunkUploadResult::InProgress(serde_json::from_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use core_runtime::events::SdkEvent;
    use mockall::mock;
    use std::io::Cursor;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(
                &self,
                url: String,
            ) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    const CHUNK: u64 = 327_680;
    const UPLOAD_URL: &str = "https://sn3302.up.1drv.com/up/abc";

    fn session(ranges: &[&str]) -> UploadSession {
        UploadSession {
            upload_url: UPLOAD_URL.to_string(),
            expiration_date_time: None,
            next_expected_ranges: ranges.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn source(len: usize) -> Cursor<Vec<u8>> {
        Cursor::new((0..len).map(|i| (i % 251) as u8).collect())
    }

    async fn provider(
        ranges: &[&str],
        len: usize,
        client: MockHttpClient,
    ) -> ChunkedUploadProvider<Cursor<Vec<u8>>> {
        ChunkedUploadProvider::new(session(ranges), Arc::new(client), source(len), Some(CHUNK))
            .await
            .unwrap()
            .with_backoff_base(Duration::from_millis(1))
    }

    fn item_body(id: &str) -> String {
        format!(r#"{{"id":"{}","name":"big.bin","size":1000000}}"#, id)
    }

    #[tokio::test]
    async fn test_chunk_requests_split_open_range() {
        let provider = provider(&["0-"], 1_000_000, MockHttpClient::new()).await;
        let chunks = provider.chunk_requests().unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!((chunks[0].range_start, chunks[0].range_end), (0, CHUNK - 1));
        assert_eq!((chunks[3].range_start, chunks[3].range_end), (3 * CHUNK, 999_999));
        assert_eq!(chunks[3].content_range(), "bytes 983040-999999/1000000");
        assert!(chunks.iter().all(|c| c.len() <= CHUNK));
    }

    #[tokio::test]
    async fn test_chunk_requests_cover_ranges_in_order() {
        let provider = provider(&["700000-799999", "12345-55232"], 1_000_000, MockHttpClient::new()).await;
        let chunks = provider.chunk_requests().unwrap();

        assert_eq!(
            chunks
                .iter()
                .map(|c| (c.range_start, c.range_end))
                .collect::<Vec<_>>(),
            vec![(12345, 55232), (700_000, 799_999)]
        );
    }

    #[tokio::test]
    async fn test_invalid_ranges_are_rejected() {
        for ranges in [
            vec!["abc"],
            vec!["10"],
            vec!["5-2"],
            vec!["0-2000000"],
            vec!["0-500", "400-"],
        ] {
            let provider = provider(&ranges, 1_000_000, MockHttpClient::new()).await;
            assert!(
                matches!(provider.chunk_requests(), Err(OneDriveError::InvalidRange(_))),
                "{:?} should be rejected",
                ranges
            );
        }
    }

    #[tokio::test]
    async fn test_chunk_size_near_u64_max_does_not_overflow() {
        let huge = u64::MAX / CHUNK * CHUNK;
        let provider = ChunkedUploadProvider::new(
            session(&["5-"]),
            Arc::new(MockHttpClient::new()),
            source(1000),
            Some(huge),
        )
        .await
        .unwrap();

        let chunks = provider.chunk_requests().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].range_start, chunks[0].range_end), (5, 999));
    }

    #[tokio::test]
    async fn test_backoff_grows_quadratically_and_saturates() {
        let provider = provider(&["0-"], 10, MockHttpClient::new()).await;

        assert_eq!(provider.backoff_delay(1), Duration::from_millis(1));
        assert_eq!(provider.backoff_delay(3), Duration::from_millis(9));
        assert_eq!(
            provider.backoff_delay(u32::MAX),
            Duration::from_millis(1).saturating_mul(u32::MAX)
        );
    }

    #[tokio::test]
    async fn test_new_validates_arguments() {
        let unaligned = ChunkedUploadProvider::new(
            session(&["0-"]),
            Arc::new(MockHttpClient::new()),
            source(10),
            Some(100_000),
        )
        .await;
        assert!(matches!(unaligned, Err(OneDriveError::InvalidArgument(_))));

        let empty = ChunkedUploadProvider::new(
            session(&["0-"]),
            Arc::new(MockHttpClient::new()),
            source(0),
            None,
        )
        .await;
        assert!(matches!(empty, Err(OneDriveError::InvalidArgument(_))));

        let default = ChunkedUploadProvider::new(
            session(&["0-"]),
            Arc::new(MockHttpClient::new()),
            source(10),
            None,
        )
        .await
        .unwrap();
        assert_eq!(default.max_chunk_size(), DEFAULT_UPLOAD_CHUNK_SIZE);
        assert_eq!(default.total_length(), 10);
    }

    #[tokio::test]
    async fn test_upload_chunk_sends_range_without_auth() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Put
                    && request.url == UPLOAD_URL
                    && request.header_value("content-range") == Some("bytes 0-327679/400000")
                    && request.header_value("content-length") == Some("327680")
                    && request.header_value("authorization").is_none()
                    && request.body.as_ref().map(|b| b.len()) == Some(327_680)
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    202,
                    r#"{"expirationDateTime":"2030-01-01T00:00:00Z","nextExpectedRanges":["327680-"]}"#,
                ))
            });

        let mut provider = provider(&["0-"], 400_000, client).await;
        let chunk = provider.chunk_requests().unwrap()[0];
        let result = provider.upload_chunk(&chunk).await.unwrap();

        match result {
            ChunkUploadResult::InProgress(session) => {
                assert_eq!(session.upload_url, UPLOAD_URL);
                assert_eq!(session.next_expected_ranges, vec!["327680-".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_completes_and_reports_progress() {
        let mut client = MockHttpClient::new();
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        client.expect_execute().times(2).returning(move |_| {
            let mut calls = counter.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(HttpResponse::new(202, r#"{"nextExpectedRanges":["327680-399999"]}"#))
            } else {
                Ok(HttpResponse::new(201, item_body("file!1")))
            }
        });

        let mut provider = provider(&["0-"], 400_000, client).await;
        let seen = Mutex::new(Vec::new());
        let callback = |p: UploadProgress| seen.lock().unwrap().push(p.bytes_uploaded);

        let item = provider.upload(3, Some(&callback)).await.unwrap();

        assert_eq!(item.id, "file!1");
        assert_eq!(*seen.lock().unwrap(), vec![0, CHUNK, 400_000]);
    }

    #[tokio::test]
    async fn test_non_transient_error_aborts() {
        let mut client = MockHttpClient::new();
        client.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                416,
                r#"{"error":{"code":"invalidRange","message":"bad range"}}"#,
            ))
        });

        let mut provider = provider(&["0-"], 400_000, client).await;
        let error = provider.upload(3, None).await.unwrap_err();

        assert!(error.is_match("invalidRange"));
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_tries() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .withf(|request| request.method == HttpMethod::Put)
            .times(2)
            .returning(|_| Err(BridgeError::Timeout("slow".to_string())));
        client
            .expect_execute()
            .withf(|request| request.method == HttpMethod::Get)
            .times(2)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"nextExpectedRanges":["0-"]}"#)));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let mut provider = provider(&["0-"], 1000, client)
            .await
            .with_event_bus(bus)
            .with_upload_id("up-1");

        let error = provider.upload(2, None).await.unwrap_err();
        match error {
            OneDriveError::UploadFailed { attempts, errors } => {
                assert_eq!(attempts, 2);
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut retried = 0;
        let mut failed = false;
        while let Ok(SdkEvent::Upload(event)) = events.try_recv() {
            match event {
                UploadEvent::ChunkRetried { upload_id, .. } => {
                    assert_eq!(upload_id, "up-1");
                    retried += 1;
                }
                UploadEvent::Failed { attempts, .. } => {
                    assert_eq!(attempts, 2);
                    failed = true;
                }
                _ => {}
            }
        }
        assert_eq!(retried, 2);
        assert!(failed);
    }

    #[tokio::test]
    async fn test_status_returning_item_completes() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .withf(|request| request.method == HttpMethod::Put)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(503, "")));
        client
            .expect_execute()
            .withf(|request| request.method == HttpMethod::Get)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, item_body("done"))));

        let mut provider = provider(&["0-"], 1000, client).await;
        let item = provider.upload(3, None).await.unwrap();
        assert_eq!(item.id, "done");
    }

    #[tokio::test]
    async fn test_delete_session() {
        let mut client = MockHttpClient::new();
        client
            .expect_execute()
            .withf(|request| request.method == HttpMethod::Delete && request.url == UPLOAD_URL)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(204, "")));

        let provider = provider(&["0-"], 1000, client).await;
        provider.delete_session().await.unwrap();
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0-", 10).unwrap(), (0, 9));
        assert_eq!(parse_range(" 3-5 ", 10).unwrap(), (3, 5));
        assert!(parse_range("-5", 10).is_err());
        assert!(parse_range("0-", 0).is_err());
    }
}
