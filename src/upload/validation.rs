use crate::config::UploadSettings;
use crate::errors::{Error, Result};
use super::types::UploadFile;

/// 提交前的文件校验规则
#[derive(Debug, Clone, Default)]
pub struct UploadPolicy {
    /// 小写、不带点；为空表示不限制
    pub allowed_extensions: Vec<String>,
    pub max_file_size: Option<u64>,
}

impl From<&UploadSettings> for UploadPolicy {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_file_size: settings.max_file_size,
        }
    }
}

impl UploadPolicy {
    pub fn check(&self, file: &UploadFile, endpoint: &str) -> Result<()> {
        if endpoint.trim().is_empty() {
            return Err(Error::validation("Upload endpoint must not be empty"));
        }

        if file.name.trim().is_empty() {
            return Err(Error::validation("File name must not be empty"));
        }

        if !self.allowed_extensions.is_empty() {
            let allowed = file
                .extension()
                .map(|ext| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
                .unwrap_or(false);

            if !allowed {
                return Err(Error::validation(format!(
                    "Unsupported file type '{}', allowed: {}",
                    file.name,
                    self.allowed_extensions.join(", ")
                )));
            }
        }

        if let Some(max_size) = self.max_file_size {
            if file.size() > max_size {
                return Err(Error::validation(format!(
                    "File '{}' is {} bytes, limit is {} bytes",
                    file.name,
                    file.size(),
                    max_size
                )));
            }
        }

        Ok(())
    }
}
