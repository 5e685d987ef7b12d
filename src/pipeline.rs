//! 受信メッセージの処理パイプライン
//!
//! 一覧取得 → メッセージ取得 → 添付抽出 → 印刷 → 既読化 を順番に実行する。
//!
//! # エラーの扱い
//! - 一覧・メッセージ取得の失敗（`RunError::Mail`）: 実行を打ち切り、ログに残して正常終了扱い
//! - ファイル書き込み・印刷の失敗（`RunError::Local`）: 実行を打ち切り、異常終了
//! - 既読化の失敗: そのメッセージだけ失敗として記録し、次のメッセージへ進む

use crate::attachments::extract_attachments;
use crate::config::AppConfig;
use crate::gmail::MessageSummary;
use crate::gmail_client::GmailClientTrait;
use crate::printer::{dispatch_prints, Printer, SpoolWait};
use std::fmt;

/// 既読化で外すラベル
pub const UNREAD_LABEL: &str = "UNREAD";

/// パイプラインを打ち切ったエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Gmail API のエラー
    Mail(String),
    /// ファイルシステム・印刷などローカル側のエラー
    Local(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mail(msg) => write!(f, "mail service error: {msg}"),
            Self::Local(msg) => write!(f, "{msg}"),
        }
    }
}

/// 既読化に失敗したメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgeFailure {
    pub message_id: String,
    pub error: String,
}

/// 1回の実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub messages_found: usize,
    pub messages_processed: usize,
    pub attachments_extracted: usize,
    pub files_printed: usize,
    pub acknowledge_failures: Vec<AcknowledgeFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.acknowledge_failures.is_empty()
    }
}

/// 未読・添付ありのメッセージをラベル指定で全ページ取得する
///
/// サーバーが返した順序のまま返す。max_pages に達した場合は警告を出して打ち切る。
pub async fn list_new_messages(
    client: &dyn GmailClientTrait,
    config: &AppConfig,
) -> Result<Vec<MessageSummary>, String> {
    let mut all_messages = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0;

    loop {
        let (messages, next_token) = client
            .list_messages(&config.label_id, &config.query, config.page_size, page_token)
            .await?;
        pages += 1;
        all_messages.extend(messages);

        match next_token {
            Some(token) if pages >= config.max_pages => {
                log::warn!(
                    "Stopped listing after {pages} pages (max_pages); remaining messages will be picked up next run (next page token: {token})"
                );
                break;
            }
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    log::debug!(
        "Listed {} message(s) in {pages} page(s)",
        all_messages.len()
    );
    Ok(all_messages)
}

/// メッセージを既読にする（UNREAD ラベルを外す）
///
/// 既に既読のメッセージに適用しても変化はない。
pub async fn acknowledge_message(
    client: &dyn GmailClientTrait,
    message_id: &str,
) -> Result<(), String> {
    client
        .modify_labels(message_id, Vec::new(), vec![UNREAD_LABEL.to_string()])
        .await
}

/// 1件のメッセージを処理する（取得 → 添付抽出 → 印刷）
///
/// # Returns
/// (抽出した添付ファイル数, 印刷したファイル数)
async fn process_message(
    client: &dyn GmailClientTrait,
    printer: &dyn Printer,
    config: &AppConfig,
    summary: &MessageSummary,
) -> Result<(usize, usize), RunError> {
    let message = client.get_message(&summary.id).await.map_err(RunError::Mail)?;
    log::info!("Processing message {}...", message.id);
    log::debug!("Message {} snippet: {}", message.id, message.snippet);

    let attachments = extract_attachments(client, &message, &config.attachments_dir)
        .await
        .map_err(RunError::Local)?;

    let printed = dispatch_prints(
        printer,
        &attachments,
        &config.allowed_extensions,
        SpoolWait::from_config(config),
    )
    .await
    .map_err(RunError::Local)?;

    Ok((attachments.len(), printed))
}

/// パイプライン全体を実行する
///
/// # Arguments
/// * `client` - Gmail クライアント
/// * `printer` - 印刷先
/// * `config` - 検証済みの設定
pub async fn run_pipeline(
    client: &dyn GmailClientTrait,
    printer: &dyn Printer,
    config: &AppConfig,
) -> Result<RunSummary, RunError> {
    let messages = list_new_messages(client, config)
        .await
        .map_err(RunError::Mail)?;

    let mut summary = RunSummary {
        messages_found: messages.len(),
        ..RunSummary::default()
    };

    if messages.is_empty() {
        log::info!("No new messages found, stopping...");
        return Ok(summary);
    }
    log::info!("Found {} new messages", messages.len());

    for message in &messages {
        let (extracted, printed) = process_message(client, printer, config, message).await?;
        summary.attachments_extracted += extracted;
        summary.files_printed += printed;

        log::info!("Done, marking message {} as read...", message.id);
        if let Err(e) = acknowledge_message(client, &message.id).await {
            log::error!("Failed to mark message {} as read: {e}", message.id);
            summary.acknowledge_failures.push(AcknowledgeFailure {
                message_id: message.id.clone(),
                error: e,
            });
            continue;
        }
        summary.messages_processed += 1;
    }

    if summary.is_success() {
        log::info!(
            "Run finished successfully, {} files sent to printer",
            summary.files_printed
        );
    } else {
        log::warn!(
            "Run finished, {} files sent to printer, {} message(s) could not be marked as read",
            summary.files_printed,
            summary.acknowledge_failures.len()
        );
    }

    Ok(summary)
}
