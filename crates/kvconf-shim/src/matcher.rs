/// Decides whether a URL names the config file.
///
/// A URL matches when it is the bare file name, ends in `/<name>`, or contains
/// `/<name>?`. `myconf.yml` does not match `conf.yml`.
#[derive(Debug, Clone)]
pub struct ConfigPathMatcher {
    filename: String,
    suffix: String,
    with_query: String,
}

impl ConfigPathMatcher {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            suffix: format!("/{}", filename),
            with_query: format!("/{}?", filename),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        url == self.filename || url.ends_with(&self.suffix) || url.contains(&self.with_query)
    }
}
