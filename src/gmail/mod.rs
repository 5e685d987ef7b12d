//! Gmail関連モジュール

pub mod auth;
pub mod client;

// clientモジュールから公開されている型をre-export
pub use client::{GmailClient, MessageDetail, MessagePart, MessageSummary, PartBody};

// 認証をre-export
pub use auth::{load_credentials, GmailAuthenticator};
