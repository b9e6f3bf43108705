use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use hf_hub::api::sync::Api;
use regex::Regex;
use tracing::{debug, info};

use crate::config::SourceKind;
use crate::error::{Error, Result};

const DRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc";

static DOWNLOAD_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<form[^>]*id="download-form"[^>]*action="([^"]+)"[^>]*>(.*?)</form>"#)
        .expect("download form pattern")
});
static HIDDEN_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
        .expect("hidden input pattern")
});
static CONFIRM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(/uc\?export=download[^"]+)""#).expect("confirm link pattern")
});

pub trait ArtifactSource: Send + Sync {
    fn fetch(&self, identifier: &str, destination: &Path) -> Result<()>;
}

pub fn source_for(kind: SourceKind) -> Box<dyn ArtifactSource> {
    match kind {
        SourceKind::GoogleDrive => Box::new(GoogleDriveSource::new()),
        SourceKind::Hub => Box::new(HubSource),
    }
}

/// Downloads publicly shared Google Drive files by file id.
pub struct GoogleDriveSource {
    agent: ureq::Agent,
    base_url: String,
}

impl Default for GoogleDriveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleDriveSource {
    pub fn new() -> Self {
        Self::with_base_url(DRIVE_DOWNLOAD_URL)
    }

    /// `base_url` takes `export=download&id=<id>` as its query.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            base_url: base_url.into(),
        }
    }
}

impl ArtifactSource for GoogleDriveSource {
    fn fetch(&self, identifier: &str, destination: &Path) -> Result<()> {
        let http_err = |e: ureq::Error| Error::provisioning(destination, e);

        let mut response = self
            .agent
            .get(self.base_url.as_str())
            .query("export", "download")
            .query("id", identifier)
            .call()
            .map_err(http_err)?;

        // Files Drive cannot virus-scan come back as an HTML interstitial
        // whose form carries the real download request.
        if is_html(&response) {
            let page = response.body_mut().read_to_string().map_err(http_err)?;
            let confirm = ConfirmRequest::parse(&page).ok_or_else(|| {
                Error::provisioning(
                    destination,
                    "drive returned a page without a download link (file not shared or quota exceeded)",
                )
            })?;
            debug!(action = %confirm.action, "following drive confirmation form");

            let mut request = self.agent.get(confirm.action.as_str());
            for (name, value) in &confirm.fields {
                request = request.query(name, value);
            }
            response = request.call().map_err(http_err)?;

            if is_html(&response) {
                return Err(Error::provisioning(
                    destination,
                    "drive kept answering with an html page instead of the file",
                ));
            }
        }

        let mut out = File::create(destination)?;
        let bytes = io::copy(&mut response.body_mut().as_reader(), &mut out)?;
        info!("Fetched {} bytes into {}", bytes, destination.display());
        Ok(())
    }
}

fn is_html(response: &ureq::http::Response<ureq::Body>) -> bool {
    response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// The follow-up request described by Drive's download warning page.
#[derive(Debug, PartialEq)]
pub struct ConfirmRequest {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl ConfirmRequest {
    pub fn parse(page: &str) -> Option<Self> {
        if let Some(caps) = DOWNLOAD_FORM.captures(page) {
            let fields = HIDDEN_INPUT
                .captures_iter(&caps[2])
                .map(|c| (unescape(&c[1]), unescape(&c[2])))
                .collect();
            return Some(Self {
                action: unescape(&caps[1]),
                fields,
            });
        }

        // Older interstitials link straight to a confirmed url instead.
        let caps = CONFIRM_LINK.captures(page)?;
        Some(Self {
            action: format!("https://drive.google.com{}", unescape(&caps[1])),
            fields: Vec::new(),
        })
    }
}

// `&amp;` goes last so an escaped entity is decoded only once.
fn unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Resolves `owner/repo:path/in/repo` through the Hugging Face Hub cache.
pub struct HubSource;

impl ArtifactSource for HubSource {
    fn fetch(&self, identifier: &str, destination: &Path) -> Result<()> {
        let (repo, file) = identifier.split_once(':').ok_or_else(|| {
            Error::provisioning(
                destination,
                format!("hub identifier `{identifier}` is not of the form owner/repo:path"),
            )
        })?;

        let api = Api::new().map_err(|e| Error::provisioning(destination, e))?;
        let cached = api
            .model(repo.to_string())
            .get(file)
            .map_err(|e| Error::provisioning(destination, e))?;

        info!("Copying {} from hub cache {:?}", file, cached);
        fs::copy(&cached, destination)?;
        Ok(())
    }
}
