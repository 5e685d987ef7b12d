//! 外部依存を持たないビジネスロジック

pub mod attachment_logic;
