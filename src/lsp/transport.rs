use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::error::{LspError, Result};

const CONTENT_LENGTH: &str = "Content-Length:";

/// Largest message body accepted from a peer
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Read one framed LSP message. Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    // Read LSP headers
    let mut content_length = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if saw_header {
                return Err(LspError::InvalidMessage(
                    "Stream ended inside message headers".to_string(),
                ));
            }
            return Ok(None);
        }

        if line == "\r\n" || line == "\n" {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;

        // Header names are case-insensitive
        let header = line.trim_end();
        let is_content_length = header
            .get(..CONTENT_LENGTH.len())
            .is_some_and(|name| name.eq_ignore_ascii_case(CONTENT_LENGTH));
        if is_content_length {
            let len_str = header[CONTENT_LENGTH.len()..].trim();
            content_length = Some(len_str.parse::<usize>().map_err(|e| {
                LspError::InvalidMessage(format!("Failed to parse content length: {}", e))
            })?);
        }
    }

    let content_length = content_length
        .ok_or_else(|| LspError::InvalidMessage("Missing Content-Length header".to_string()))?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(LspError::InvalidMessage(format!(
            "Content-Length {} exceeds limit of {} bytes",
            content_length, MAX_CONTENT_LENGTH
        )));
    }

    // Read the message body
    let mut buffer = vec![0u8; content_length];
    reader.read_exact(&mut buffer).await?;

    let message = String::from_utf8(buffer)
        .map_err(|e| LspError::InvalidMessage(format!("Message body is not UTF-8: {}", e)))?;
    trace!("Received LSP message: {}", message);
    Ok(Some(message))
}

/// Write one framed LSP message
pub async fn write_message<W>(writer: &mut W, message: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", message.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(message.as_bytes()).await?;
    writer.flush().await?;

    trace!("Sent LSP message: {}", message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut writer) = tokio::io::split(client);
        let (reader, _) = tokio::io::split(server);
        let mut reader = BufReader::new(reader);

        let first = r#"{"jsonrpc":"2.0","id":1,"method":"test"}"#;
        let second = r#"{"jsonrpc":"2.0","method":"ünïcode"}"#;
        write_message(&mut writer, first).await.unwrap();
        write_message(&mut writer, second).await.unwrap();

        assert_eq!(read_message(&mut reader).await.unwrap().as_deref(), Some(first));
        assert_eq!(read_message(&mut reader).await.unwrap().as_deref(), Some(second));
    }

    #[tokio::test]
    async fn test_extra_headers_and_case() {
        let body = r#"{"jsonrpc":"2.0","method":"x"}"#;
        let raw = format!(
            "content-length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = BufReader::new(raw.as_bytes());
        assert_eq!(read_message(&mut reader).await.unwrap().as_deref(), Some(body));
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let mut reader = BufReader::new("Content-Type: x\r\n\r\n{}".as_bytes());
        assert!(matches!(
            read_message(&mut reader).await,
            Err(LspError::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_content_length_rejected() {
        let raw = format!("Content-Length: {}\r\n\r\n{{}}", usize::MAX);
        let mut reader = BufReader::new(raw.as_bytes());
        assert!(matches!(
            read_message(&mut reader).await,
            Err(LspError::InvalidMessage(message)) if message.contains("exceeds")
        ));
    }
}
