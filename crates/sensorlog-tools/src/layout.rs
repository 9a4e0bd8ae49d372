//! # 输出目录布局
//!
//! 每个 (subject, trial) 一组文件：
//!
//! ```text
//! <root>/<subject>/<trial>/GPS.txt
//! <root>/<subject>/<trial>/Acc.txt
//! <root>/<subject>/<trial>/Shutter.txt
//! ```
//!
//! 目录逐级创建（已存在不算失败）。任何一级创建失败时退化为
//! `<root>/<subject>_<trial>_GPS.txt` 这样的平铺命名。

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_SUBJECT: &str = "s01";
pub const DEFAULT_TRIAL: &str = "t01";

pub const GPS_FILE_NAME: &str = "GPS.txt";
pub const ACC_FILE_NAME: &str = "Acc.txt";
pub const SHUTTER_FILE_NAME: &str = "Shutter.txt";

/// 输出位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDir {
    /// `<root>/<subject>/<trial>/`
    Nested(PathBuf),
    /// `<root>/` 下以前缀区分
    Flat { dir: PathBuf, prefix: String },
}

impl OutputDir {
    /// 文件完整路径
    pub fn file(&self, name: &str) -> PathBuf {
        match self {
            OutputDir::Nested(dir) => dir.join(name),
            OutputDir::Flat { dir, prefix } => dir.join(format!("{}{}", prefix, name)),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, OutputDir::Flat { .. })
    }
}

/// 会话输出布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    pub root: PathBuf,
    pub subject: String,
    pub trial: String,
}

impl Default for SessionLayout {
    fn default() -> Self {
        Self::new(".", DEFAULT_SUBJECT, DEFAULT_TRIAL)
    }
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>, subject: impl Into<String>, trial: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            subject: subject.into(),
            trial: trial.into(),
        }
    }

    pub fn nested_dir(&self) -> PathBuf {
        self.root.join(&self.subject).join(&self.trial)
    }

    pub fn flat_prefix(&self) -> String {
        format!("{}_{}_", self.subject, self.trial)
    }

    /// 写出后会覆盖已有文件
    ///
    /// 嵌套目录或平铺命名下任一输出文件已存在即为 `true`。
    pub fn would_overwrite(&self) -> bool {
        let nested = OutputDir::Nested(self.nested_dir());
        let flat = OutputDir::Flat {
            dir: self.root.clone(),
            prefix: self.flat_prefix(),
        };
        [GPS_FILE_NAME, ACC_FILE_NAME, SHUTTER_FILE_NAME]
            .iter()
            .any(|name| nested.file(name).exists() || flat.file(name).exists())
    }

    /// 创建目录并返回输出位置
    pub fn resolve(&self) -> OutputDir {
        let subject_dir = self.root.join(&self.subject);
        if let Err(e) = ensure_dir(&subject_dir) {
            warn!("Cannot create {}: {}, using flat file names", subject_dir.display(), e);
            return self.flat();
        }

        let trial_dir = subject_dir.join(&self.trial);
        if let Err(e) = ensure_dir(&trial_dir) {
            warn!("Cannot create {}: {}, using flat file names", trial_dir.display(), e);
            return self.flat();
        }

        OutputDir::Nested(trial_dir)
    }

    fn flat(&self) -> OutputDir {
        OutputDir::Flat {
            dir: self.root.clone(),
            prefix: self.flat_prefix(),
        }
    }
}

/// 单级创建；目标已是目录时视为成功
fn ensure_dir(path: &Path) -> std::io::Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(_) if path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
