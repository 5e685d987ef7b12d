//! プリンタへの印刷投入（Print Dispatcher）
//!
//! 印刷は `Printer` トレイトで抽象化し、テストではモックに置き換える。
//! 実機では CUPS の `lp`（Unix）または Shell の Print 動詞（Windows）を使う。
//!
//! # 既知の制約
//! 印刷が実際に完了したかは確認しない。ジョブIDが取れる環境ではスプーラーの
//! キューから消えるまでポーリングし、取れない環境では固定時間だけ待つ。

use crate::attachments::Attachment;
use crate::config::{AppConfig, Duplex};
use crate::logic::attachment_logic::is_printable;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 投入済みの印刷ジョブ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub path: PathBuf,
    /// スプーラーが返したジョブID（取得できない環境では None）
    pub job_id: Option<String>,
}

/// 印刷機能を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Printer: Send + Sync {
    /// ファイルを印刷キューに投入する
    async fn submit(&self, path: &Path) -> Result<JobHandle, String>;

    /// ジョブがまだキューに残っているか
    ///
    /// Some(true): 待機中 / Some(false): キューから消えた / None: 確認できない
    async fn is_pending(&self, job: &JobHandle) -> Option<bool>;
}

/// 印刷投入後の待機設定
#[derive(Debug, Clone, Copy)]
pub struct SpoolWait {
    /// 最大待機時間（ポーリングできない場合はこの時間だけ待つ）
    pub max_delay: Duration,
    pub poll_interval: Duration,
}

impl SpoolWait {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_delay: Duration::from_secs(config.print_delay_secs),
            poll_interval: Duration::from_secs(config.print_poll_interval_secs),
        }
    }
}

/// OS の印刷機能を使うプリンタ
pub struct SystemPrinter {
    name: Option<String>,
    duplex: Duplex,
}

impl SystemPrinter {
    pub fn new(name: Option<String>, duplex: Duplex) -> Self {
        Self { name, duplex }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.printer.name.clone(), config.printer.duplex)
    }

    #[cfg(not(windows))]
    fn build_command(&self, path: &Path) -> tokio::process::Command {
        let mut command = tokio::process::Command::new("lp");
        if let Some(name) = &self.name {
            command.arg("-d").arg(name);
        }
        command
            .arg("-o")
            .arg(format!("sides={}", self.duplex.cups_sides()))
            .arg("--")
            .arg(path);
        command
    }

    #[cfg(windows)]
    fn build_command(&self, path: &Path) -> tokio::process::Command {
        if self.name.is_some() || self.duplex != Duplex::Simplex {
            log::warn!(
                "Printer name and duplex settings are not supported with the shell print verb; using the default printer settings"
            );
        }
        // PowerShell の単一引用符文字列では ' を '' にエスケープする
        let quoted = path.display().to_string().replace('\'', "''");
        let script = format!("Start-Process -FilePath '{quoted}' -Verb Print");
        let mut command = tokio::process::Command::new("powershell");
        command.args(["-NoProfile", "-NonInteractive", "-Command", script.as_str()]);
        command
    }
}

#[async_trait]
impl Printer for SystemPrinter {
    async fn submit(&self, path: &Path) -> Result<JobHandle, String> {
        let output = self
            .build_command(path)
            .output()
            .await
            .map_err(|e| format!("Failed to start print command: {e}"))?;

        if !output.status.success() {
            return Err(format!(
                "Print command failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let job_id = parse_lp_job_id(&String::from_utf8_lossy(&output.stdout));
        Ok(JobHandle {
            path: path.to_path_buf(),
            job_id,
        })
    }

    async fn is_pending(&self, job: &JobHandle) -> Option<bool> {
        if cfg!(windows) {
            return None;
        }
        let job_id = job.job_id.as_deref()?;

        let mut command = tokio::process::Command::new("lpstat");
        command.arg("-o");
        if let Some(name) = &self.name {
            command.arg(name);
        }

        match command.output().await {
            Ok(output) if output.status.success() => Some(lpstat_has_job(
                &String::from_utf8_lossy(&output.stdout),
                job_id,
            )),
            Ok(output) => {
                log::warn!("lpstat failed ({}), cannot poll job {job_id}", output.status);
                None
            }
            Err(e) => {
                log::warn!("Failed to run lpstat: {e}");
                None
            }
        }
    }
}

/// `lp` の出力（例: "request id is Office-12 (1 file(s))"）からジョブIDを取り出す
pub fn parse_lp_job_id(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("request id is ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
    })
}

/// `lpstat -o` の出力にジョブIDが含まれるか（各行の先頭がジョブID）
pub fn lpstat_has_job(stdout: &str, job_id: &str) -> bool {
    stdout
        .lines()
        .any(|line| line.split_whitespace().next() == Some(job_id))
}

/// スプーラーがジョブを受け付けるまで待つ
async fn wait_for_spooler(printer: &dyn Printer, job: &JobHandle, wait: SpoolWait) {
    if wait.max_delay.is_zero() {
        return;
    }

    if let Some(job_id) = job.job_id.as_deref().filter(|_| !wait.poll_interval.is_zero()) {
        let deadline = tokio::time::Instant::now() + wait.max_delay;
        loop {
            match printer.is_pending(job).await {
                Some(false) => {
                    log::info!("Print job {job_id} left the spooler queue");
                    return;
                }
                Some(true) => {}
                None => {
                    // 確認できない場合は残り時間を待つ
                    tokio::time::sleep_until(deadline).await;
                    return;
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                log::warn!(
                    "Print job {job_id} still queued after {}s, continuing",
                    wait.max_delay.as_secs()
                );
                return;
            }
            tokio::time::sleep(wait.poll_interval.min(deadline - now)).await;
        }
    }

    log::info!(
        "Waiting {}s for the print spooler...",
        wait.max_delay.as_secs()
    );
    tokio::time::sleep(wait.max_delay).await;
}

/// 許可リストに含まれる添付ファイルを順番に印刷する
///
/// # Returns
/// プリンタに投入したファイル数
pub async fn dispatch_prints(
    printer: &dyn Printer,
    attachments: &[Attachment],
    allowed_extensions: &[String],
    wait: SpoolWait,
) -> Result<usize, String> {
    let mut printed = 0;

    for attachment in attachments {
        if !is_printable(&attachment.filename, allowed_extensions) {
            log::info!(
                "Skipping {}: extension not in allowed list {:?}",
                attachment.filename,
                allowed_extensions
            );
            continue;
        }

        log::info!("Printing file {}...", attachment.filename);
        let job = printer
            .submit(&attachment.path)
            .await
            .map_err(|e| format!("Failed to print {}: {e}", attachment.path.display()))?;
        printed += 1;

        if let Some(job_id) = &job.job_id {
            log::info!("Print job {job_id} submitted");
        }

        wait_for_spooler(printer, &job, wait).await;
    }

    Ok(printed)
}
