mod normalize;
mod progress_stream;
mod request;
mod retry;
mod transport;
mod types;

pub use normalize::{is_document, is_json, normalize, parse_content_disposition};
pub use progress_stream::{ProgressCallback, ProgressStream, TransferProgress};
pub use request::RequestClient;
pub use retry::{retry_with_policy, RetryPolicy};
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse, UploadRequest};
pub use types::{BinaryPayload, NormalizedResponse, PayloadKind, RequestConfig};
