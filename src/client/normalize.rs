use crate::errors::{Error, Result};
use super::transport::TransportResponse;
use super::types::{BinaryPayload, NormalizedResponse, PayloadKind};

pub const DEFAULT_DOCUMENT_NAME: &str = "document.docx";
pub const DEFAULT_BINARY_NAME: &str = "download.bin";

/// Office 文档的 MIME 前缀
const DOCUMENT_MIME_PREFIXES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.",
    "application/vnd.ms-",
    "application/msword",
];

/// 非 2xx 转成 `Error::Http`，否则按 `Content-Type` 归一化
pub fn normalize(response: TransportResponse) -> Result<NormalizedResponse> {
    if !response.is_success() {
        return Err(Error::http(response.status, response.status_text));
    }

    let content_type = response
        .header("content-type")
        .unwrap_or("application/octet-stream")
        .to_string();

    if is_json(&content_type) {
        let value = serde_json::from_slice(&response.body)
            .map_err(|err| Error::parse(format!("Invalid JSON body: {}", err)))?;
        return Ok(NormalizedResponse::Json(value));
    }

    let kind = if is_document(&content_type) {
        PayloadKind::Document
    } else {
        PayloadKind::Binary
    };

    let filename = response
        .header("content-disposition")
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| match kind {
            PayloadKind::Document => DEFAULT_DOCUMENT_NAME.to_string(),
            PayloadKind::Binary => DEFAULT_BINARY_NAME.to_string(),
        });

    Ok(NormalizedResponse::Binary(BinaryPayload {
        kind,
        bytes: response.body,
        content_type,
        filename,
    }))
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_json(content_type: &str) -> bool {
    let essence = essence(content_type);
    essence == "application/json" || essence.ends_with("+json")
}

pub fn is_document(content_type: &str) -> bool {
    let essence = essence(content_type);
    DOCUMENT_MIME_PREFIXES
        .iter()
        .any(|prefix| essence.starts_with(prefix))
}

/// 解析 `Content-Disposition` 中的文件名，`filename*` 优先
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;

    for (key, raw) in disposition_params(value) {
        match key.as_str() {
            "filename*" => {
                // RFC 5987: charset'lang'percent-encoded
                let Some(encoded) = raw.splitn(3, '\'').nth(2) else {
                    continue;
                };
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    if !decoded.is_empty() {
                        return Some(decoded.into_owned());
                    }
                }
            }
            "filename" if !raw.is_empty() => plain = Some(raw),
            _ => {}
        }
    }

    plain
}

/// 按 `;` 切分参数，返回小写的 key 和去掉引号的值
///
/// 引号内的 `;` 不分隔参数，`\x` 还原为 `x`。
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = value.chars().peekable();

    while chars.peek().is_some() {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }

        let mut param = String::new();
        if chars.next_if_eq(&'=').is_some() {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            if chars.next_if_eq(&'"').is_some() {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => param.extend(chars.next()),
                        '"' => break,
                        _ => param.push(c),
                    }
                }
                // 结束引号之后到下一个 `;` 的内容丢弃
                while chars.next().is_some_and(|c| c != ';') {}
            } else {
                while let Some(c) = chars.next() {
                    if c == ';' {
                        break;
                    }
                    param.push(c);
                }
                param = param.trim().to_string();
            }
        } else {
            chars.next();
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            params.push((key, param));
        }
    }

    params
}
