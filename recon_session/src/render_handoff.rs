use recon_types::ModelInfo;
use url::Url;

use crate::errors::{Result, SessionError};

/// What the renderer receives once a completed model has been confirmed.  `model_url` is
/// always absolute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderHandoff {
    model_url: Url,
    model_type: String,
    file_name: Option<String>,
}

impl RenderHandoff {
    pub fn resolve(endpoint: &str, info: &ModelInfo) -> Result<Self> {
        Ok(Self {
            model_url: resolve_model_url(endpoint, &info.model_url)?,
            model_type: info.model_type.clone(),
            file_name: info.file_name.clone(),
        })
    }

    pub fn model_url(&self) -> &Url {
        &self.model_url
    }

    /// Format hint such as `obj`, `ply` or `glb`.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Name of the model file, taken from the service or from the last URL segment.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref().or_else(|| {
            self.model_url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
        })
    }
}

/// Resolves a model URL reported by the service into an absolute http(s) URL.
///
/// Root-relative paths such as `/api/download/abc/model.obj` are appended to the
/// endpoint (so an endpoint mounted under a path prefix keeps it); other relative paths
/// are joined onto the endpoint as a directory.
pub fn resolve_model_url(endpoint: &str, model_url: &str) -> Result<Url> {
    let model_url = model_url.trim();
    if model_url.is_empty() {
        return Err(SessionError::Resource("model info did not include a model URL".to_owned()));
    }

    let resolved = match Url::parse(model_url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = endpoint.trim_end_matches('/');
            let joined = if model_url.starts_with('/') {
                Url::parse(&format!("{base}{model_url}"))
            } else {
                Url::parse(&format!("{base}/")).and_then(|b| b.join(model_url))
            };
            joined.map_err(|e| SessionError::Resource(format!("cannot resolve model URL {model_url:?}: {e}")))?
        },
        Err(e) => return Err(SessionError::Resource(format!("invalid model URL {model_url:?}: {e}"))),
    };

    match resolved.scheme() {
        "http" | "https" => Ok(resolved),
        scheme => Err(SessionError::Resource(format!("unsupported model URL scheme {scheme:?}"))),
    }
}
