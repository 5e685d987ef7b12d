//! 添付ファイルの抽出（Attachment Extractor）
//!
//! メッセージのパート木から添付ファイルを集め、`<attachments_dir>/<message_id>/<filename>`
//! に書き出す。添付ファイル参照の取得に失敗した場合はその添付だけをスキップし、
//! 残りの添付は処理を続ける。ファイルの書き込みエラーは呼び出し元に返す。

use crate::gmail::{MessageDetail, MessagePart};
use crate::gmail_client::GmailClientTrait;
use crate::logic::attachment_logic::{collect_attachment_parts, sanitize_filename};
use std::path::{Path, PathBuf};

/// ローカルに書き出した添付ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// 無害化済みのファイル名
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
}

/// メッセージごとの保存先ディレクトリ
pub fn message_dir(attachments_dir: &Path, message_id: &str) -> PathBuf {
    let dir_name = sanitize_filename(message_id).unwrap_or_else(|| "message".to_string());
    attachments_dir.join(dir_name)
}

/// パートの本文を解決する（インラインデータ、または添付ファイル参照から取得）
///
/// どちらも API クライアントが base64url をデコード済みのバイト列で、そのまま書き出す。
async fn resolve_part_data(
    client: &dyn GmailClientTrait,
    message_id: &str,
    part: &MessagePart,
) -> Result<Vec<u8>, String> {
    let body = part
        .body
        .as_ref()
        .ok_or_else(|| "Part has no body".to_string())?;

    if let Some(data) = body.data.as_ref().filter(|d| !d.is_empty()) {
        return Ok(data.clone());
    }

    let attachment_id = body
        .attachment_id
        .as_deref()
        .ok_or_else(|| "Part has neither inline data nor attachment reference".to_string())?;

    let data = client.get_attachment(message_id, attachment_id).await?;
    if data.is_empty() {
        return Err(format!("Attachment {attachment_id} has no data"));
    }
    Ok(data)
}

/// メッセージの添付ファイルをすべて書き出す
///
/// # Arguments
/// * `client` - Gmail クライアント（添付ファイル参照の取得に使用）
/// * `message` - payload 込みのメッセージ
/// * `attachments_dir` - 保存先のルートディレクトリ
///
/// # Returns
/// 書き出した添付ファイルのリスト（メール内の出現順）。
/// 個々の添付の取得失敗はログに出してスキップする。
pub async fn extract_attachments(
    client: &dyn GmailClientTrait,
    message: &MessageDetail,
    attachments_dir: &Path,
) -> Result<Vec<Attachment>, String> {
    let Some(payload) = &message.payload else {
        log::info!("Message {} has no payload, nothing to extract", message.id);
        return Ok(Vec::new());
    };

    let parts = collect_attachment_parts(payload);
    log::info!(
        "Found {} attachment(s) in message {}",
        parts.len(),
        message.id
    );
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let target_dir = message_dir(attachments_dir, &message.id);
    let mut extracted = Vec::with_capacity(parts.len());

    for (index, part) in parts.into_iter().enumerate() {
        let original = part.filename().unwrap_or_default();
        let filename =
            sanitize_filename(original).unwrap_or_else(|| format!("attachment-{}", index + 1));
        if filename != original {
            log::warn!(
                "Attachment filename sanitized for message {} (part {})",
                message.id,
                index + 1
            );
        }

        let data = match resolve_part_data(client, &message.id, part).await {
            Ok(data) => data,
            Err(e) => {
                log::error!(
                    "Failed to resolve attachment {} of message {}: {e}",
                    index + 1,
                    message.id
                );
                continue;
            }
        };

        tokio::fs::create_dir_all(&target_dir).await.map_err(|e| {
            format!(
                "Failed to create attachments dir {}: {e}",
                target_dir.display()
            )
        })?;

        let path = target_dir.join(&filename);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| format!("Failed to write attachment {}: {e}", path.display()))?;

        log::info!("Saved attachment {} ({} bytes)", path.display(), data.len());
        extracted.push(Attachment {
            filename,
            path,
            size: data.len(),
        });
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::PartBody;
    use crate::gmail_client::MockGmailClientTrait;
    use tempfile::TempDir;

    fn inline_part(filename: &str, content: &[u8]) -> MessagePart {
        MessagePart {
            filename: Some(filename.to_string()),
            body: Some(PartBody {
                data: Some(content.to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn reference_part(filename: &str, attachment_id: &str) -> MessagePart {
        MessagePart {
            filename: Some(filename.to_string()),
            body: Some(PartBody {
                attachment_id: Some(attachment_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn message(id: &str, parts: Vec<MessagePart>) -> MessageDetail {
        MessageDetail {
            id: id.to_string(),
            snippet: "fax".to_string(),
            label_ids: vec!["UNREAD".to_string()],
            payload: Some(MessagePart {
                mime_type: Some("multipart/mixed".to_string()),
                filename: Some(String::new()),
                parts,
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_extract_inline_attachment_round_trip() {
        let dir = TempDir::new().unwrap();
        let mock = MockGmailClientTrait::new();
        let content = b"%PDF-1.4 inline test document";

        let msg = message("msg1", vec![inline_part("fax.pdf", content)]);
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].filename, "fax.pdf");
        assert_eq!(result[0].size, content.len());
        assert_eq!(result[0].path, dir.path().join("msg1").join("fax.pdf"));
        assert_eq!(std::fs::read(&result[0].path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_extract_writes_base64_looking_content_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockGmailClientTrait::new();
        mock.expect_get_attachment()
            .returning(|_, _| Ok(b"QUJDRA==".to_vec()));

        let msg = message(
            "msg1",
            vec![
                inline_part("codes.txt", b"abcd1234"),
                reference_part("notes.txt", "att-1"),
            ],
        );
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(std::fs::read(&result[0].path).unwrap(), b"abcd1234");
        assert_eq!(result[0].size, 8);
        assert_eq!(std::fs::read(&result[1].path).unwrap(), b"QUJDRA==");
    }

    #[tokio::test]
    async fn test_extract_skips_empty_reference_data() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockGmailClientTrait::new();
        mock.expect_get_attachment().returning(|_, _| Ok(Vec::new()));

        let msg = message("msg1", vec![reference_part("empty.pdf", "att-1")]);
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_extract_reference_attachment() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockGmailClientTrait::new();
        let png = vec![0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        let returned = png.clone();

        mock.expect_get_attachment()
            .withf(|message_id, attachment_id| message_id == "msg1" && attachment_id == "att-png")
            .times(1)
            .returning(move |_, _| Ok(returned.clone()));

        let msg = message("msg1", vec![reference_part("scan.png", "att-png")]);
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(std::fs::read(&result[0].path).unwrap(), png);
    }

    #[tokio::test]
    async fn test_extract_skips_failed_reference_and_keeps_others() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockGmailClientTrait::new();

        mock.expect_get_attachment()
            .returning(|_, attachment_id| match attachment_id {
                "att-2" => Err("Failed to get attachment: 500 Internal Server Error".to_string()),
                other => Ok(format!("%PDF-1.4 {other}").into_bytes()),
            });

        let msg = message(
            "msg1",
            vec![
                reference_part("one.pdf", "att-1"),
                reference_part("two.pdf", "att-2"),
                reference_part("three.pdf", "att-3"),
            ],
        );
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        let names: Vec<&str> = result.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["one.pdf", "three.pdf"]);
        assert!(!dir.path().join("msg1").join("two.pdf").exists());
    }

    #[tokio::test]
    async fn test_extract_ignores_parts_without_filename() {
        let dir = TempDir::new().unwrap();
        let mock = MockGmailClientTrait::new();

        let msg = message(
            "msg1",
            vec![
                inline_part("", b"plain text body"),
                MessagePart {
                    filename: None,
                    body: Some(PartBody {
                        attachment_id: Some("att-x".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        );
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert!(result.is_empty());
        // 添付が無ければディレクトリも作らない
        assert!(!dir.path().join("msg1").exists());
    }

    #[tokio::test]
    async fn test_extract_sanitizes_traversal_filename() {
        let dir = TempDir::new().unwrap();
        let mock = MockGmailClientTrait::new();

        let msg = message(
            "msg1",
            vec![
                inline_part("../../evil.pdf", b"%PDF-1.4 evil"),
                inline_part("..", b"%PDF-1.4 dots"),
            ],
        );
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].path, dir.path().join("msg1").join("evil.pdf"));
        assert_eq!(result[1].filename, "attachment-2");
        for attachment in &result {
            assert!(attachment.path.starts_with(dir.path()));
        }
    }

    #[tokio::test]
    async fn test_extract_message_without_payload() {
        let dir = TempDir::new().unwrap();
        let mock = MockGmailClientTrait::new();

        let msg = MessageDetail {
            id: "msg1".to_string(),
            ..Default::default()
        };
        let result = extract_attachments(&mock, &msg, dir.path()).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_message_dir_sanitizes_id() {
        let root = Path::new("attachments");
        assert_eq!(message_dir(root, "18c2f"), root.join("18c2f"));
        assert_eq!(message_dir(root, "../x"), root.join("x"));
        assert_eq!(message_dir(root, ".."), root.join("message"));
    }
}
