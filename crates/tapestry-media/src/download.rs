//! Plain HTTP media download.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::browser::ResolvedMedia;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_parent_dir, remove_file_if_exists};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Build the client used for media downloads.
pub fn download_client(timeout_secs: u64) -> MediaResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MediaError::download_failed(format!("failed to build HTTP client: {}", e)))
}

/// Stream `media.src_url` to `output` with the session cookies attached.
///
/// Returns the number of bytes written. A partial file is removed on failure.
pub async fn download_media(
    client: &reqwest::Client,
    media: &ResolvedMedia,
    output: impl AsRef<Path>,
) -> MediaResult<u64> {
    let output = output.as_ref();
    ensure_parent_dir(output).await?;

    match stream_to_file(client, media, output).await {
        Ok(bytes) => {
            info!(bytes, output = %output.display(), "Downloaded media");
            Ok(bytes)
        }
        Err(e) => {
            remove_file_if_exists(output).await?;
            Err(e)
        }
    }
}

async fn stream_to_file(
    client: &reqwest::Client,
    media: &ResolvedMedia,
    output: &Path,
) -> MediaResult<u64> {
    let mut request = client
        .get(&media.src_url)
        .header(USER_AGENT, DEFAULT_USER_AGENT)
        .header(REFERER, &media.page_url);
    if let Some(cookies) = media.cookie_header() {
        request = request.header(COOKIE, cookies);
    }

    let response = request
        .send()
        .await
        .map_err(|e| MediaError::download_failed(e.to_string()))?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(MediaError::DownloadStatus(status.as_u16()));
    }

    let mut file = tokio::fs::File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MediaError::download_failed(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(MediaError::download_failed("empty response body"));
    }
    debug!(src = %media.src_url, written, "Stream complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionCookie;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn media(server: &MockServer) -> ResolvedMedia {
        ResolvedMedia {
            page_url: "https://www.tiktok.com/@creator/video/42".to_string(),
            src_url: format!("{}/video.mp4", server.uri()),
            cookies: vec![SessionCookie {
                name: "sid".to_string(),
                value: "s3cr3t".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_download_sends_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .and(header("cookie", "sid=s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("42.mp4");
        let client = download_client(10).unwrap();

        let bytes = download_media(&client, &media(&server), &output).await.unwrap();
        assert_eq!(bytes, 1024);
        assert_eq!(std::fs::read(&output).unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn test_non_200_removes_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("42.mp4");
        let client = download_client(10).unwrap();

        let err = download_media(&client, &media(&server), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadStatus(403)));
        assert!(err.is_acquisition_failure());
        assert!(!output.exists());
    }
}
