use std::path::Path;
use std::process::ExitCode;

pub mod attachments;
pub mod config;
pub mod gmail;
pub mod gmail_client;
pub mod logging;
pub mod logic;
pub mod pipeline;
pub mod printer;

use crate::config::AppConfig;
use crate::gmail::GmailClient;
use crate::pipeline::{run_pipeline, RunError, RunSummary};
use crate::printer::SystemPrinter;

/// 実行結果からプロセスの終了コードを決める
///
/// - 0: 正常終了、または Gmail API のエラーで打ち切った場合
/// - 1: ローカル側のエラー、または既読化に失敗したメッセージがある場合
pub fn exit_status(result: &Result<RunSummary, RunError>) -> u8 {
    match result {
        Ok(summary) if summary.is_success() => 0,
        Ok(_) => 1,
        Err(RunError::Mail(_)) => 0,
        Err(RunError::Local(_)) => 1,
    }
}

/// 認証からパイプライン実行までを行う
async fn execute(config: &AppConfig) -> Result<RunSummary, RunError> {
    config.validate().map_err(RunError::Local)?;

    let auth = gmail::load_credentials(
        &config.client_secret_path,
        &config.token_path,
        &config.scopes,
    )
    .await
    .map_err(RunError::Local)?;

    let client = GmailClient::new(auth, config.scopes.clone()).map_err(RunError::Local)?;
    let printer = SystemPrinter::from_config(config);

    run_pipeline(&client, &printer, config).await
}

/// エントリポイント
///
/// カレントディレクトリの vvf_fax_config.json を読み込み、1回分の処理を実行する。
pub async fn run() -> ExitCode {
    let config_path = Path::new(config::CONFIG_FILENAME);
    let loaded = config::load(config_path);

    let log_file = loaded
        .as_ref()
        .map(|l| l.config.log_file.clone())
        .unwrap_or_else(|_| AppConfig::default().log_file);
    logging::init_logger(&log_file);

    log::info!("VVF FAX starting...");
    if loaded.as_ref().is_ok_and(|l| l.created) {
        log::info!("Created default config file at {}", config_path.display());
    }

    // 複数の暗号プロバイダが有効な場合に備えて ring を明示的に選ぶ
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("rustls crypto provider already installed");
    }

    let result = match loaded {
        Ok(loaded) => execute(&loaded.config).await,
        Err(e) => Err(RunError::Local(e)),
    };

    match &result {
        Ok(summary) => log::debug!("Run summary: {summary:?}"),
        Err(RunError::Mail(e)) => log::error!("An error occurred: {e}"),
        Err(RunError::Local(e)) => log::error!("Run aborted: {e}"),
    }

    ExitCode::from(exit_status(&result))
}
