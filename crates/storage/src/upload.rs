//! Resumable upload state machine.
//!
//! One upload session: POST creates the session, a PUT carries the
//! payload. After a transient failure the machine asks the session for
//! the committed offset (`Content-Range: bytes */{total}`) and resumes
//! from there. A gone session (410) is recreated once; a second loss is
//! terminal.

use rusty_gcsfs_common::{ErrorKind, GcsError};
use rusty_gcsfs_http::{call_with_retries, HttpRequest, HttpResponse};
use tracing::{debug, warn};

use crate::client::{encode_object_name, gs_uri, GcsClient, GCS_UPLOAD_BASE};

/// Outcome of an upload-status query.
enum UploadStatus {
    /// The session already holds the full payload.
    Complete,
    /// Bytes up to (but excluding) the offset are committed.
    Incomplete(u64),
}

/// Uploads one object's payload through a resumable session.
pub struct ResumableUpload<'a> {
    client: &'a GcsClient,
    bucket: &'a str,
    object: &'a str,
    uri: String,
}

impl<'a> ResumableUpload<'a> {
    pub fn new(client: &'a GcsClient, bucket: &'a str, object: &'a str) -> Self {
        let uri: String = gs_uri(bucket, object);
        Self {
            client,
            bucket,
            object,
            uri,
        }
    }

    /// Run the state machine until the payload is fully committed.
    ///
    /// The first round PUTs the whole payload. Each retry round queries
    /// the committed offset and PUTs the remainder. The round budget is
    /// the client's retry budget; exhaustion reports `Aborted` naming
    /// the count and the last cause.
    pub async fn run(&self, data: &[u8]) -> Result<(), GcsError> {
        let total: u64 = data.len() as u64;
        let mut session_uri: String = self.create_session(total).await?;
        let mut session_recreated: bool = false;
        let max_rounds: u32 = self.client.retry_config().max_attempts;
        let mut last_error: Option<GcsError> = None;

        // Committed offset when known; `None` forces a status query.
        let mut committed: Option<u64> = Some(0);

        for _attempt in 0..=max_rounds {
            let put_offset: u64 = match committed.take() {
                Some(offset) => offset,
                None => match self.query_status(&session_uri, total).await {
                    Ok(UploadStatus::Complete) => return Ok(()),
                    Ok(UploadStatus::Incomplete(offset)) => {
                        debug!(uri = %self.uri, offset, "resuming upload");
                        offset
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        if session_recreated {
                            return Err(self.session_gone(e));
                        }
                        session_recreated = true;
                        warn!(uri = %self.uri, "upload session gone, starting a new one");
                        session_uri = self.create_session(total).await?;
                        committed = Some(0);
                        continue;
                    }
                    Err(e) if e.is_retryable() => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            match self.put_from(&session_uri, data, put_offset, total).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    // 308 from the body PUT: committed offset unknown.
                    last_error = Some(GcsError::unavailable(format!(
                        "upload of {} still incomplete after PUT",
                        self.uri
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if session_recreated {
                        return Err(self.session_gone(e));
                    }
                    session_recreated = true;
                    warn!(uri = %self.uri, "upload session gone, starting a new one");
                    session_uri = self.create_session(total).await?;
                    committed = Some(0);
                }
                Err(e) if e.is_retryable() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last: String = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(GcsError::Aborted {
            message: format!(
                "All {} retry attempts failed. The last failure: {} when uploading {}",
                max_rounds, last, self.uri
            ),
        })
    }

    fn session_gone(&self, cause: GcsError) -> GcsError {
        GcsError::unavailable(format!(
            "upload to {} failed, caused by: {}",
            self.uri, cause
        ))
    }

    /// POST a new session; the `Location` header is the session URI.
    async fn create_session(&self, total: u64) -> Result<String, GcsError> {
        let url: String = format!(
            "{}/b/{}/o?uploadType=resumable&name={}",
            GCS_UPLOAD_BASE,
            self.bucket,
            encode_object_name(self.object)
        );

        call_with_retries(self.client.retry_config(), || async {
            let request = self
                .client
                .authorized(HttpRequest::post(&url))
                .await?
                .header("X-Upload-Content-Length", total.to_string())
                .timeouts(self.client.timeout_config().metadata_timeouts());
            let response: HttpResponse = self.client.send(&request).await?;
            self.client.check(&response, &self.uri)?;
            response
                .header("Location")
                .map(|location| location.to_string())
                .ok_or_else(|| {
                    GcsError::internal(format!(
                        "upload session response for {} carries no Location header",
                        self.uri
                    ))
                })
        })
        .await
    }

    /// PUT `data[offset..]`. `Ok(true)` when the session reports the
    /// upload complete, `Ok(false)` on 308.
    async fn put_from(
        &self,
        session_uri: &str,
        data: &[u8],
        offset: u64,
        total: u64,
    ) -> Result<bool, GcsError> {
        let mut request = self
            .client
            .authorized(HttpRequest::put(session_uri))
            .await?;
        if total > 0 {
            request = request.header(
                "Content-Range",
                format!("bytes {}-{}/{}", offset, total - 1, total),
            );
        }
        let request = request
            .timeouts(self.client.timeout_config().write_timeouts())
            .body(data[offset as usize..].to_vec());

        let response: HttpResponse = self.client.send(&request).await?;
        if response.status == 308 {
            return Ok(false);
        }
        self.client.check(&response, &self.uri)?;
        Ok(true)
    }

    /// Ask the session how many bytes are committed.
    async fn query_status(
        &self,
        session_uri: &str,
        total: u64,
    ) -> Result<UploadStatus, GcsError> {
        let request = self
            .client
            .authorized(HttpRequest::put(session_uri))
            .await?
            .header("Content-Range", format!("bytes */{}", total))
            .timeouts(self.client.timeout_config().metadata_timeouts());

        let response: HttpResponse = self.client.send(&request).await?;
        if response.is_success() {
            return Ok(UploadStatus::Complete);
        }
        if response.status == 308 {
            let committed: u64 = parse_committed_range(response.header("Range"), &self.uri)?;
            return Ok(UploadStatus::Incomplete(committed));
        }
        self.client.check(&response, &self.uri)?;
        Err(GcsError::internal(format!(
            "unexpected upload status response {} for {}",
            response.status, self.uri
        )))
    }
}

/// Number of committed bytes from a 308 `Range` header.
///
/// The header reads `0-N` or `bytes=0-N`, N being the highest committed
/// byte; no header means nothing is committed yet.
fn parse_committed_range(header: Option<&str>, uri: &str) -> Result<u64, GcsError> {
    let header: &str = match header {
        Some(header) => header,
        None => return Ok(0),
    };
    let range: &str = header.strip_prefix("bytes=").unwrap_or(header);
    let last: &str = range.split_once('-').map(|(_, last)| last).unwrap_or("");
    let last: u64 = last.parse::<u64>().map_err(|_| {
        GcsError::internal(format!(
            "unexpected Range header '{}' in upload status response for {}",
            header, uri
        ))
    })?;
    Ok(last + 1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rusty_gcsfs_http::{RetryConfig, ScriptedCall, ScriptedTransport};

    use super::*;
    use crate::auth::StaticAuthProvider;
    use crate::client::TimeoutConfig;

    const SESSION_REQUEST: &str =
        "POST https://www.googleapis.com/upload/storage/v1/b/bucket/o?\
         uploadType=resumable&name=path%2Fwriteable.txt\n\
         Header Authorization: Bearer fake_token\n\
         Header X-Upload-Content-Length: 17\n\
         Timeouts: 5 1 10\n";

    const QUERY_REQUEST: &str = "PUT https://custom/upload/location\n\
         Header Authorization: Bearer fake_token\n\
         Header Content-Range: bytes */17\n\
         Timeouts: 5 1 10\n";

    fn session_reply(expected: &str) -> ScriptedCall {
        ScriptedCall::new(expected, 200, "")
            .respond_header("Location", "https://custom/upload/location")
    }

    fn put_request(range: &str, body: &str) -> String {
        format!(
            "PUT https://custom/upload/location\n\
             Header Authorization: Bearer fake_token\n\
             Header Content-Range: bytes {}\n\
             Timeouts: 5 1 30\n\
             Body: {}\n",
            range, body
        )
    }

    fn test_client(calls: Vec<ScriptedCall>) -> (GcsClient, Arc<ScriptedTransport>) {
        let transport: Arc<ScriptedTransport> = Arc::new(ScriptedTransport::new(calls));
        let client: GcsClient = GcsClient::new(
            transport.clone(),
            Arc::new(StaticAuthProvider::new("fake_token")),
            TimeoutConfig {
                connect: Duration::from_secs(5),
                idle: Duration::from_secs(1),
                metadata: Duration::from_secs(10),
                read: Duration::from_secs(20),
                write: Duration::from_secs(30),
            },
            RetryConfig::with_init_delay_us(0),
            None,
        );
        (client, transport)
    }

    #[test]
    fn test_parse_committed_range() {
        assert_eq!(parse_committed_range(Some("0-10"), "gs://b/o").unwrap(), 11);
        assert_eq!(
            parse_committed_range(Some("bytes=0-12"), "gs://b/o").unwrap(),
            13
        );
        assert_eq!(parse_committed_range(None, "gs://b/o").unwrap(), 0);
        assert!(parse_committed_range(Some("garbage"), "gs://b/o").is_err());
    }

    #[tokio::test]
    async fn test_upload_single_put() {
        let (client, transport) = test_client(vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 200, ""),
        ]);

        ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap();
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_upload_resumes_after_transient_failures() {
        // Mirrors an interrupted upload: each 503/308 is followed by a
        // status query whose Range header steers the resumed PUT.
        let (client, transport) = test_client(vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 503, ""),
            ScriptedCall::new(QUERY_REQUEST, 308, "").respond_header("Range", "0-10"),
            ScriptedCall::new(put_request("11-16/17", "ntent2"), 503, ""),
            ScriptedCall::new(QUERY_REQUEST, 308, "").respond_header("Range", "bytes=0-12"),
            ScriptedCall::new(put_request("13-16/17", "ent2"), 308, ""),
            ScriptedCall::new(QUERY_REQUEST, 308, "").respond_header("Range", "bytes=0-14"),
            ScriptedCall::new(put_request("15-16/17", "t2"), 200, ""),
        ]);

        ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap();
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_upload_completes_on_status_query() {
        let (client, transport) = test_client(vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 503, ""),
            ScriptedCall::new(QUERY_REQUEST, 201, ""),
        ]);

        ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap();
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_upload_exhausts_retries() {
        let mut calls: Vec<ScriptedCall> = vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 503, ""),
        ];
        for _ in 0..10 {
            calls.push(ScriptedCall::new(QUERY_REQUEST, 308, "").respond_header("Range", "0-10"));
            calls.push(ScriptedCall::new(put_request("11-16/17", "ntent2"), 503, ""));
        }
        let (client, transport) = test_client(calls);

        let err: GcsError = ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aborted);
        let message: String = err.to_string();
        assert!(message.contains("All 10 retry attempts failed"));
        assert!(message.contains("gs://bucket/path/writeable.txt"));
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_upload_recreates_gone_session_once() {
        let (client, transport) = test_client(vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 410, ""),
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 200, ""),
        ]);

        ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap();
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_upload_persistent_session_gone_is_unavailable() {
        let (client, transport) = test_client(vec![
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 410, ""),
            session_reply(SESSION_REQUEST),
            ScriptedCall::new(put_request("0-16/17", "content1,content2"), 410, ""),
        ]);

        let err: GcsError = ResumableUpload::new(&client, "bucket", "path/writeable.txt")
            .run(b"content1,content2")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        let message: String = err.to_string();
        assert!(message.contains("upload to gs://bucket/path/writeable.txt failed"));
        assert!(message.contains("caused by"));
        transport.assert_drained();
    }

    #[tokio::test]
    async fn test_empty_upload_has_no_content_range() {
        // Directory markers are zero-length objects; their PUT carries
        // no Content-Range header.
        let (client, transport) = test_client(vec![
            ScriptedCall::new(
                "POST https://www.googleapis.com/upload/storage/v1/b/bucket/o?\
                 uploadType=resumable&name=subpath%2F\n\
                 Header Authorization: Bearer fake_token\n\
                 Header X-Upload-Content-Length: 0\n\
                 Timeouts: 5 1 10\n",
                200,
                "",
            )
            .respond_header("Location", "https://custom/upload/location"),
            ScriptedCall::new(
                "PUT https://custom/upload/location\n\
                 Header Authorization: Bearer fake_token\n\
                 Timeouts: 5 1 30\n\
                 Body: \n",
                200,
                "",
            ),
        ]);

        ResumableUpload::new(&client, "bucket", "subpath/")
            .run(b"")
            .await
            .unwrap();
        transport.assert_drained();
    }
}
