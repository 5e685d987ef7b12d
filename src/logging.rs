//! ログ出力の初期化
//!
//! env_logger でコンソール（標準出力）に出しつつ、同じ行をログファイルにも追記する。
//! 既定レベルは Info。RUST_LOG 環境変数で上書きできる。

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

// ログファイル用グローバルMutex
static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);

/// 1行分のログを整形する（例: "2026-10-19 09:30:00,123 INFO  Found 1 new messages"）
pub fn format_log_line(timestamp: &DateTime<Local>, level: log::Level, message: &str) -> String {
    format!(
        "{} {:5} {}",
        timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
        level,
        message
    )
}

/// ログファイルを追記モードで開く
///
/// 開けなかった場合はコンソール出力のみで継続する。
pub fn open_log_file(path: &Path) {
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", path.display());
            None
        }
    };

    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = file,
        Err(e) => eprintln!("Failed to lock log file: {e}"),
    }
}

/// ログファイルに1行追記する
///
/// ログファイルが未初期化の場合は何もしない。
pub fn append_log_line(line: &str) {
    match LOG_FILE.lock() {
        Ok(mut guard) => {
            if let Some(file) = guard.as_mut() {
                if let Err(e) = writeln!(file, "{line}") {
                    // ログシステム自体が問題を抱えているため、通常のログ機能は使えない
                    eprintln!("Failed to write log file: {e}");
                }
            }
        }
        Err(e) => eprintln!("Failed to lock log file for writing: {e}"),
    }
}

/// ロガーを初期化する（プロセスで一度だけ呼ぶこと）
pub fn init_logger(log_file: &Path) {
    open_log_file(log_file);

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let line = format_log_line(&Local::now(), record.level(), &record.args().to_string());
            append_log_line(&line);
            writeln!(buf, "{line}")
        })
        .init();
}
