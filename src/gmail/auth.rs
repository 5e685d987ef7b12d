//! Gmail OAuth 認証（Credential Loader）
//!
//! token.json の形式によって認証方法を選ぶ。
//! - Google の authorized_user 形式（client_id・client_secret・refresh_token を含む）:
//!   そのリフレッシュトークンでアクセストークンを取得する。credentials.json は不要。
//! - yup-oauth2 のトークンキャッシュ、またはファイルなし: credentials.json を使い、
//!   キャッシュが有効ならそれを使う。期限切れならリフレッシュし、無ければブラウザでの
//!   対話的認証を行う。取得したトークンは token.json に保存される。
//!
//! # セキュリティガイドライン
//! - client_id/client_secret、アクセストークンは絶対にログに出力しないこと

use google_gmail1::hyper_rustls;
use hyper_util::client::legacy::connect::HttpConnector;
use std::path::Path;
use yup_oauth2 as oauth2;
use yup_oauth2::authorized_user::AuthorizedUserSecret;

/// Gmail Hub に渡す Authenticator の型
pub type GmailAuthenticator =
    oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<HttpConnector>>;

// カスタムInstalledFlowDelegateでブラウザを自動的に開く
struct CustomFlowDelegate;

impl oauth2::authenticator_delegate::InstalledFlowDelegate for CustomFlowDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, String>> + Send + 'a>>
    {
        Box::pin(async move {
            log::info!("Opening browser for Gmail authorization...");

            // ブラウザで認証URLを開く
            if let Err(e) = webbrowser::open(url) {
                log::warn!("Failed to open browser automatically: {e}");
                log::warn!("Please open this URL manually in your browser:");
                log::warn!("{url}");
            } else {
                log::info!("Browser opened successfully. Please complete the authentication in your browser.");
            }

            if need_code {
                log::info!("Waiting for authentication code...");
            }

            // HTTPRedirectモードでは空文字列を返す（リダイレクトでコードを受け取る）
            Ok(String::new())
        })
    }
}

/// client_secret の JSON 文字列を解析する
///
/// Google Cloud Consoleからダウンロードした形式に対応:
/// - "installed" キー（デスクトップアプリ用）
/// - "web" キー（Webアプリ用）
pub fn parse_client_secret(json_content: &str) -> Result<oauth2::ApplicationSecret, String> {
    let secret = oauth2::parse_application_secret(json_content).map_err(|e| {
        format!("Invalid client secret format (expected 'installed' or 'web' key): {e}")
    })?;

    if secret.client_id.is_empty() {
        return Err("Gmail client_id is empty".to_string());
    }
    if secret.client_secret.is_empty() {
        return Err("Gmail client_secret is empty".to_string());
    }

    Ok(secret)
}

/// client_secret ファイルを読み込む
///
/// # セキュリティ
/// client_id/client_secretはログに出力されません
pub async fn read_client_secret(path: &Path) -> Result<oauth2::ApplicationSecret, String> {
    if !path.exists() {
        return Err(format!(
            "Client secret file not found. Please place the OAuth client JSON downloaded from Google Cloud Console at: {}",
            path.display()
        ));
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read client secret {}: {e}", path.display()))?;

    let secret = parse_client_secret(&contents)?;
    log::info!("Gmail OAuth client secret loaded successfully");
    Ok(secret)
}

/// 認証情報の取得元
#[derive(Debug)]
pub enum CredentialSource {
    /// authorized_user 形式の token.json
    AuthorizedUser(AuthorizedUserSecret),
    /// credentials.json による installed flow
    InstalledFlow(oauth2::ApplicationSecret),
}

/// authorized_user 形式のトークン JSON を解析する
///
/// Google の認証ライブラリが書き出す token.json には "type" が無いため補う。
/// リフレッシュトークンを持たない JSON や、yup-oauth2 のキャッシュ形式（配列）は None。
pub fn parse_authorized_user(json_content: &str) -> Result<Option<AuthorizedUserSecret>, String> {
    let Ok(serde_json::Value::Object(mut map)) =
        serde_json::from_str::<serde_json::Value>(json_content)
    else {
        return Ok(None);
    };

    let has_refresh_token = map
        .get("refresh_token")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|token| !token.is_empty());
    if !has_refresh_token {
        return Ok(None);
    }

    map.entry("type")
        .or_insert_with(|| serde_json::Value::String("authorized_user".to_string()));

    let secret: AuthorizedUserSecret = serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| format!("Invalid authorized user token file: {e}"))?;
    if secret.client_id.is_empty() || secret.client_secret.is_empty() {
        return Err("Authorized user token file has empty client_id or client_secret".to_string());
    }
    Ok(Some(secret))
}

/// token.json と credentials.json から認証情報の取得元を決める
///
/// credentials.json が必要になるのは authorized_user 形式のトークンが無い場合だけ。
pub async fn credential_source(
    client_secret_path: &Path,
    token_path: &Path,
) -> Result<CredentialSource, String> {
    if token_path.exists() {
        let contents = tokio::fs::read_to_string(token_path)
            .await
            .map_err(|e| format!("Failed to read token cache {}: {e}", token_path.display()))?;
        if let Some(secret) = parse_authorized_user(&contents)? {
            log::info!(
                "Using authorized user credentials from {}",
                token_path.display()
            );
            return Ok(CredentialSource::AuthorizedUser(secret));
        }
        log::info!("Using cached credentials from {}", token_path.display());
    } else {
        log::info!("No cached credentials found, starting OAuth authentication flow...");
    }

    read_client_secret(client_secret_path)
        .await
        .map(CredentialSource::InstalledFlow)
}

/// authorized_user 形式の認証情報から Authenticator を構築する
pub async fn build_authorized_user_authenticator(
    secret: AuthorizedUserSecret,
) -> Result<GmailAuthenticator, String> {
    oauth2::AuthorizedUserAuthenticator::builder(secret)
        .build()
        .await
        .map_err(|e| format!("Failed to create authenticator: {e}"))
}

/// Authenticator を構築する
///
/// トークンキャッシュ（token_path）があればそれを使い、必要に応じてリフレッシュする。
/// 有効なトークンが無い場合は最初の token() 呼び出しで対話的認証が始まる。
pub async fn build_authenticator(
    secret: oauth2::ApplicationSecret,
    token_path: &Path,
) -> Result<GmailAuthenticator, String> {
    // カスタムブラウザオープナーを使用してHTTPRedirectモードで認証
    // （一時的なローカルリスナーでリダイレクトを受け取る）
    oauth2::InstalledFlowAuthenticator::builder(
        secret,
        oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_path)
    .flow_delegate(Box::new(CustomFlowDelegate))
    .build()
    .await
    .map_err(|e| {
        format!(
            "Failed to create authenticator: {e}\n\n\
            If a browser window didn't open, please check the log for the authentication URL and open it manually."
        )
    })
}

/// 有効なアクセストークンを取得し、Authenticator を返す
///
/// # Arguments
/// * `client_secret_path` - OAuth クライアントシークレット（credentials.json、対話的認証時に必要）
/// * `token_path` - トークンキャッシュ（token.json、存在しなくてもよい）
/// * `scopes` - 要求するスコープ
pub async fn load_credentials(
    client_secret_path: &Path,
    token_path: &Path,
    scopes: &[String],
) -> Result<GmailAuthenticator, String> {
    let auth = match credential_source(client_secret_path, token_path).await? {
        CredentialSource::AuthorizedUser(secret) => {
            build_authorized_user_authenticator(secret).await?
        }
        CredentialSource::InstalledFlow(secret) => {
            build_authenticator(secret, token_path).await?
        }
    };

    // トークンを取得して認証を確実にする
    // ※get_token が None を返すと Authorization ヘッダーが付与されず 403 エラーになる
    log::info!("Requesting OAuth token...");
    let token = auth
        .token(scopes)
        .await
        .map_err(|e| format!("Failed to get OAuth token: {e}"))?;
    let token_str = token.token().unwrap_or("");
    if token_str.is_empty() {
        return Err(format!(
            "OAuth token is empty. Please re-authenticate: delete {} and run again.",
            token_path.display()
        ));
    }
    log::info!(
        "OAuth token obtained successfully (len={})",
        token_str.len()
    );

    Ok(auth)
}
