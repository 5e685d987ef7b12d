//! アプリケーション設定ファイルの管理
//!
//! ラベルID・印刷対象拡張子・OAuthスコープなどを vvf_fax_config.json で管理する。
//! ファイルが無い場合はデフォルト値で作成する。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "vvf_fax_config.json";

/// Gmail の全権限スコープ（メッセージの既読化に必要）
pub const FULL_MAIL_SCOPE: &str = "https://mail.google.com/";

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 監視対象のラベルID（例: "Label_4140688616999534095"）
    pub label_id: String,
    /// 印刷対象の拡張子（小文字・ドットなし）
    pub allowed_extensions: Vec<String>,
    pub scopes: Vec<String>,
    /// Gmail検索クエリ（ラベル指定とは別に適用される）
    pub query: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// 印刷投入後の待機時間（秒）
    pub print_delay_secs: u64,
    pub print_poll_interval_secs: u64,
    pub attachments_dir: PathBuf,
    pub token_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub log_file: PathBuf,
    pub printer: PrinterConfig,
}

/// プリンタ設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// None の場合はOSのデフォルトプリンタ
    pub name: Option<String>,
    pub duplex: Duplex,
}

/// 両面印刷の設定
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Duplex {
    Simplex,
    LongEdge,
    #[default]
    ShortEdge,
}

impl Duplex {
    /// CUPS の `sides` オプション値
    pub const fn cups_sides(self) -> &'static str {
        match self {
            Self::Simplex => "one-sided",
            Self::LongEdge => "two-sided-long-edge",
            Self::ShortEdge => "two-sided-short-edge",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            label_id: String::new(),
            allowed_extensions: vec!["pdf".to_string()],
            scopes: vec![FULL_MAIL_SCOPE.to_string()],
            query: "is:unread has:attachment".to_string(),
            page_size: 100,
            max_pages: 50,
            print_delay_secs: 30,
            print_poll_interval_secs: 2,
            attachments_dir: PathBuf::from("attachments"),
            token_path: PathBuf::from("token.json"),
            client_secret_path: PathBuf::from("credentials.json"),
            log_file: PathBuf::from("vvf_fax.log"),
            printer: PrinterConfig::default(),
        }
    }
}

impl AppConfig {
    /// 設定値の妥当性をチェックする
    pub fn validate(&self) -> Result<(), String> {
        if self.label_id.trim().is_empty() {
            return Err(format!(
                "label_id is not configured. Set the Gmail label id in {CONFIG_FILENAME}"
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err("allowed_extensions must contain at least one extension".to_string());
        }
        if self.scopes.is_empty() {
            return Err("scopes must contain at least one OAuth scope".to_string());
        }
        if self.page_size == 0 {
            return Err("page_size must be 1 or greater".to_string());
        }
        if self.max_pages == 0 {
            return Err("max_pages must be 1 or greater".to_string());
        }
        Ok(())
    }

    /// 拡張子を小文字・先頭ドットなしに正規化する
    fn normalize(mut self) -> Self {
        self.allowed_extensions = self
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }
}

/// 読み込んだ設定
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// ファイルが無かったためデフォルトで作成した
    pub created: bool,
}

/// 設定を読み込む。ファイルが存在しない場合はデフォルトを返し、保存する。
///
/// ロガー初期化前に呼ばれるため、ここではログを出さない。
pub fn load(path: &Path) -> Result<LoadedConfig, String> {
    if path.exists() {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {e}"))?;
        let config: AppConfig =
            serde_json::from_str(&contents).map_err(|e| format!("Invalid config JSON: {e}"))?;
        Ok(LoadedConfig {
            config: config.normalize(),
            created: false,
        })
    } else {
        let config = AppConfig::default();
        save(path, &config)?;
        Ok(LoadedConfig {
            config,
            created: true,
        })
    }
}

/// 設定を保存する。
pub fn save(path: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {e}"))?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    fs::write(path, contents).map_err(|e| format!("Failed to write config file: {e}"))
}
