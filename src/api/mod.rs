pub mod models;

use std::fmt;

use reqwest::{Client, Method, StatusCode, multipart};
use serde::Deserialize;
use serde_json::Value;

/// Result type for backend API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Structured error returned by the backend API, or synthesized for
/// transport failures.
#[derive(Clone, Debug)]
pub struct ApiError {
    status: u16,
    detail: ErrorDetail,
}

#[derive(Clone, Debug)]
pub enum ErrorDetail {
    Message(String),
    /// 422 validation errors, flattened to (field, message) and deduplicated
    /// by field. The API may report the same input from several server-side
    /// dependencies; the last message per field wins.
    Fields(Vec<(String, String)>),
}

impl ApiError {
    pub fn new(status: u16, detail: ErrorDetail) -> Self {
        Self { status, detail }
    }

    /// Transport-level failure, surfaced with service-unavailable semantics.
    pub fn unavailable(err: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            detail: ErrorDetail::Message(format!("API unreachable: {err}")),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn detail(&self) -> &ErrorDetail {
        &self.detail
    }

    fn from_payload(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorPayload {
            detail: Value,
        }

        #[derive(Deserialize)]
        struct ValidationError {
            #[serde(default)]
            loc: Vec<Value>,
            msg: String,
        }

        let detail = match serde_json::from_str::<ErrorPayload>(body) {
            Ok(payload) => match payload.detail {
                Value::String(message) => ErrorDetail::Message(message),
                Value::Array(raw_errors) if status == 422 => {
                    let mut fields: Vec<(String, String)> = Vec::new();
                    for raw in raw_errors {
                        let Ok(error) = serde_json::from_value::<ValidationError>(raw) else {
                            continue;
                        };
                        // loc is (location, field, ...); the field name is
                        // the second element when present
                        let field = error
                            .loc
                            .get(1)
                            .or_else(|| error.loc.last())
                            .and_then(Value::as_str)
                            .unwrap_or("input")
                            .to_string();
                        if let Some(existing) = fields.iter_mut().find(|(f, _)| *f == field) {
                            existing.1 = error.msg;
                        } else {
                            fields.push((field, error.msg));
                        }
                    }
                    ErrorDetail::Fields(fields)
                }
                other => ErrorDetail::Message(other.to_string()),
            },
            Err(_) => ErrorDetail::Message(if body.trim().is_empty() {
                format!("API call failed with status {status}")
            } else {
                body.to_string()
            }),
        };

        Self { status, detail }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            ErrorDetail::Message(message) => write!(f, "{} ({})", message, self.status),
            ErrorDetail::Fields(fields) => {
                let joined = fields
                    .iter()
                    .map(|(field, msg)| format!("{field}: {msg}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "{} ({})", joined, self.status)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// File payload forwarded to the API's archive upload endpoint.
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub filename: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

/// Thin client for the backend data API. Durable state and business rules
/// live behind these endpoints; this client only shuttles JSON and files,
/// attaching the caller's bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        token: Option<&str>,
    ) -> ApiResult<Value> {
        self.request(Method::GET, path, params, None, token).await
    }

    pub async fn post(&self, path: &str, body: Value, token: Option<&str>) -> ApiResult<Value> {
        self.request(Method::POST, path, &[], Some(body), token).await
    }

    pub async fn put(&self, path: &str, body: Value, token: Option<&str>) -> ApiResult<Value> {
        self.request(Method::PUT, path, &[], Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> ApiResult<Value> {
        self.request(Method::DELETE, path, &[], None, token).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Value>,
        token: Option<&str>,
    ) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, &url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(ApiError::unavailable)?;
        Self::decode(response).await
    }

    /// Upload a file with its metadata as a multipart request. Metadata
    /// travels as query parameters, mirroring the archive endpoint contract.
    pub async fn put_file(
        &self,
        path: &str,
        upload: FileUpload,
        params: &[(&str, String)],
        token: Option<&str>,
    ) -> ApiResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.mimetype)
            .map_err(ApiError::unavailable)?;
        let form = multipart::Form::new().part("file", part);

        let mut builder = self.http.put(&url).query(params).multipart(form);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(ApiError::unavailable)?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> ApiResult<Value> {
        let status = response.status();
        let body = response.text().await.map_err(ApiError::unavailable)?;

        if !status.is_success() {
            return Err(ApiError::from_payload(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| ApiError::new(status.as_u16(), ErrorDetail::Message(format!("unexpected API payload: {err}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client() -> (MockServer, ApiClient) {
        let server = MockServer::start().await;
        let client = ApiClient::new(Client::new(), server.uri());
        (server, client)
    }

    #[tokio::test]
    async fn get_attaches_bearer_token_and_params() {
        let (server, api) = client().await;
        Mock::given(method("GET"))
            .and(path("/package/"))
            .and(header("authorization", "Bearer tok-1"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [], "total": 0, "page": 2, "pages": 1,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let value = api
            .get("/package/", &[("page", "2".to_string())], Some("tok-1"))
            .await
            .unwrap();
        assert_eq!(value["page"], 2);
    }

    #[tokio::test]
    async fn validation_errors_flatten_and_dedup_by_field() {
        let (server, api) = client().await;
        Mock::given(method("POST"))
            .and(path("/package/"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "detail": [
                    {"loc": ["body", "title"], "msg": "field required"},
                    {"loc": ["body", "title"], "msg": "title must not be empty"},
                    {"loc": ["body", "provider_id"], "msg": "unknown provider"},
                ],
            })))
            .mount(&server)
            .await;

        let err = api.post("/package/", json!({}), None).await.unwrap_err();
        assert_eq!(err.status(), 422);
        match err.detail() {
            ErrorDetail::Fields(fields) => {
                assert_eq!(
                    fields,
                    &vec![
                        ("title".to_string(), "title must not be empty".to_string()),
                        ("provider_id".to_string(), "unknown provider".to_string()),
                    ]
                );
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn string_detail_is_preserved() {
        let (server, api) = client().await;
        Mock::given(method("GET"))
            .and(path("/package/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": "Package not found",
            })))
            .mount(&server)
            .await;

        let err = api.get("/package/missing", &[], None).await.unwrap_err();
        assert_eq!(err.status(), 404);
        match err.detail() {
            ErrorDetail::Message(message) => assert_eq!(message, "Package not found"),
            other => panic!("expected message detail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_null() {
        let (server, api) = client().await;
        Mock::given(method("DELETE"))
            .and(path("/package/p1/tag/t1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value = api.delete("/package/p1/tag/t1", None).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn file_upload_sends_multipart_with_metadata_params() {
        let (server, api) = client().await;
        Mock::given(method("PUT"))
            .and(path("/archive/arch-1/prov-1/p1/"))
            .and(query_param("filename", "data.csv"))
            .and(query_param("package_id", "p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "res-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let upload = FileUpload {
            filename: "data.csv".to_string(),
            mimetype: "text/csv".to_string(),
            bytes: b"a,b\n1,2\n".to_vec(),
        };
        let value = api
            .put_file(
                "/archive/arch-1/prov-1/p1/",
                upload,
                &[
                    ("filename", "data.csv".to_string()),
                    ("package_id", "p1".to_string()),
                ],
                Some("tok"),
            )
            .await
            .unwrap();
        assert_eq!(value["id"], "res-1");
    }

    #[tokio::test]
    async fn unreachable_api_maps_to_service_unavailable() {
        let api = ApiClient::new(Client::new(), "http://127.0.0.1:1");
        let err = api.get("/package/", &[], None).await.unwrap_err();
        assert_eq!(err.status(), 503);
    }
}
