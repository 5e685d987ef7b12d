//! Gmail API クライアントのトレイト定義とモック対応
//!
//! このモジュールは Gmail API 操作を抽象化し、テスト時にモック可能にします。

use crate::gmail::{MessageDetail, MessageSummary};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Gmail API の操作を抽象化するトレイト
///
/// このトレイトを実装することで、本番環境では実際の Gmail API を使用し、
/// テスト環境ではモックを使用してテストできます。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GmailClientTrait: Send + Sync {
    /// ラベルとクエリに一致するメッセージの一覧を1ページ分取得
    /// page_token に前回の nextPageToken を渡すと次のページを取得
    /// Returns (messages, next_page_token)
    async fn list_messages(
        &self,
        label_id: &str,
        query: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<(Vec<MessageSummary>, Option<String>), String>;

    /// 単一メッセージを payload 込みで取得
    async fn get_message(&self, message_id: &str) -> Result<MessageDetail, String>;

    /// 添付ファイル参照から本文データを取得
    ///
    /// 戻り値は base64url をデコード済みの添付ファイルの中身。
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, String>;

    /// メッセージのラベルを追加・削除
    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: Vec<String>,
        remove_label_ids: Vec<String>,
    ) -> Result<(), String>;
}
