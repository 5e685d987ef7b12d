//! Gmail API連携モジュール
//!
//! # セキュリティガイドライン
//! このモジュールはユーザーのメールデータを扱うため、以下のセキュリティルールを厳守してください：
//!
//! - **機密情報のログ出力禁止**: メール本文、件名、添付ファイルの内容をログに出力しないこと
//! - **デバッグログの制限**: base64データの内容、メールペイロードの詳細を出力しないこと
//! - **メトリクスのみ**: info 以上で出力できるのはID、件数、バイト数などの統計情報のみ

use crate::gmail_client::GmailClientTrait;
use async_trait::async_trait;
use google_gmail1::api::ModifyMessageRequest;
use google_gmail1::{hyper_rustls, Gmail};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};

/// Gmail API のユーザーID（認証済みユーザー自身）
const USER_ID: &str = "me";

/// 一覧取得で返るメッセージ概要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: Option<String>,
}

/// payload を含むメッセージ詳細
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    pub snippet: String,
    pub label_ids: Vec<String>,
    pub payload: Option<MessagePart>,
}

/// MIMEパート（入れ子のサブパートを持つ）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePart {
    pub part_id: Option<String>,
    pub mime_type: Option<String>,
    /// 添付ファイル以外のパートでは空文字列になる
    pub filename: Option<String>,
    pub body: Option<PartBody>,
    pub parts: Vec<MessagePart>,
}

/// パートの本文。インラインデータか添付ファイル参照のどちらか（または両方なし）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    pub attachment_id: Option<String>,
    /// インラインデータ（google-gmail1 が base64url をデコード済み）
    pub data: Option<Vec<u8>>,
    pub size: Option<i32>,
}

impl MessagePart {
    /// 空でないファイル名を持つ場合のみ返す
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref().filter(|name| !name.is_empty())
    }
}

impl From<google_gmail1::api::MessagePart> for MessagePart {
    fn from(part: google_gmail1::api::MessagePart) -> Self {
        Self {
            part_id: part.part_id,
            mime_type: part.mime_type,
            filename: part.filename,
            body: part.body.map(PartBody::from),
            parts: part
                .parts
                .unwrap_or_default()
                .into_iter()
                .map(Self::from)
                .collect(),
        }
    }
}

impl From<google_gmail1::api::MessagePartBody> for PartBody {
    fn from(body: google_gmail1::api::MessagePartBody) -> Self {
        Self {
            attachment_id: body.attachment_id,
            data: body.data,
            size: body.size,
        }
    }
}

pub struct GmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<HttpConnector>>,
    scopes: Vec<String>,
}

impl GmailClient {
    /// 認証済みの Authenticator から Gmail クライアントを作成
    pub fn new(
        auth: crate::gmail::auth::GmailAuthenticator,
        scopes: Vec<String>,
    ) -> Result<Self, String> {
        let client = Client::builder(TokioExecutor::new()).build(Self::build_connector()?);
        let hub = Gmail::new(client, auth);
        Ok(Self { hub, scopes })
    }

    /// 固定のアクセストークンで Gmail クライアントを作成
    ///
    /// base_url を指定すると API のエンドポイントを差し替える（末尾は `/`）。
    pub fn with_access_token(
        access_token: String,
        base_url: Option<String>,
        scopes: Vec<String>,
    ) -> Result<Self, String> {
        let client = Client::builder(TokioExecutor::new()).build(Self::build_connector()?);
        let mut hub = Gmail::new(client, access_token);
        if let Some(url) = base_url {
            hub.base_url(url);
        }
        Ok(Self { hub, scopes })
    }

    /// Gmail Hub用のHTTPコネクタを作成
    fn build_connector() -> Result<hyper_rustls::HttpsConnector<HttpConnector>, String> {
        Ok(hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| format!("Failed to create HTTPS connector: {e}"))?
            .https_or_http()
            .enable_http1()
            .build())
    }
}

/// GmailClientTrait の実装
///
/// これにより GmailClient をモックに置き換えてテストできます。
#[async_trait]
impl GmailClientTrait for GmailClient {
    async fn list_messages(
        &self,
        label_id: &str,
        query: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> Result<(Vec<MessageSummary>, Option<String>), String> {
        let mut req = self
            .hub
            .users()
            .messages_list(USER_ID)
            .add_label_ids(label_id)
            .q(query)
            .max_results(max_results)
            .add_scopes(self.scopes.iter());

        if let Some(ref token) = page_token {
            req = req.page_token(token);
        }

        let (_, result) = req
            .doit()
            .await
            .map_err(|e| format!("Failed to list messages: {e}"))?;

        log::debug!(
            "List response: {} messages, estimate={:?}, has_next_page={}",
            result.messages.as_ref().map_or(0, Vec::len),
            result.result_size_estimate,
            result.next_page_token.is_some()
        );

        let messages = result
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| {
                msg.id.map(|id| MessageSummary {
                    id,
                    thread_id: msg.thread_id,
                })
            })
            .collect();

        Ok((messages, result.next_page_token))
    }

    async fn get_message(&self, message_id: &str) -> Result<MessageDetail, String> {
        log::debug!("Fetching message: {message_id}");

        let (response, message) = self
            .hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("full")
            .add_scopes(self.scopes.iter())
            .doit()
            .await
            .map_err(|e| format!("Failed to get message {message_id}: {e}"))?;

        log::debug!("Response status: {:?}", response.status());

        if message.payload.is_none() {
            log::warn!("Message {message_id} has no payload");
        }

        Ok(MessageDetail {
            id: message.id.unwrap_or_else(|| message_id.to_string()),
            snippet: message.snippet.unwrap_or_default(),
            label_ids: message.label_ids.unwrap_or_default(),
            payload: message.payload.map(MessagePart::from),
        })
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, String> {
        let (_, body) = self
            .hub
            .users()
            .messages_attachments_get(USER_ID, message_id, attachment_id)
            .add_scopes(self.scopes.iter())
            .doit()
            .await
            .map_err(|e| format!("Failed to get attachment of message {message_id}: {e}"))?;

        body.data
            .ok_or_else(|| format!("Attachment of message {message_id} has no data"))
    }

    async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: Vec<String>,
        remove_label_ids: Vec<String>,
    ) -> Result<(), String> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(add_label_ids),
            remove_label_ids: Some(remove_label_ids),
        };

        self.hub
            .users()
            .messages_modify(request, USER_ID, message_id)
            .add_scopes(self.scopes.iter())
            .doit()
            .await
            .map_err(|e| format!("Failed to modify labels of message {message_id}: {e}"))?;

        Ok(())
    }
}
