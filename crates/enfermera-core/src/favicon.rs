use url::Url;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";
const FAVICON_SIZE: u32 = 32;

pub fn hostname(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
}

/// Icon URL for the citation's host; `None` hides the icon.
pub fn favicon_url(uri: &str) -> Option<String> {
    let host = hostname(uri)?;
    let mut url = Url::parse(FAVICON_SERVICE).ok()?;
    url.query_pairs_mut()
        .append_pair("domain", &host)
        .append_pair("sz", &FAVICON_SIZE.to_string());
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn favicon_is_keyed_by_hostname() {
        assert_eq!(
            favicon_url("https://www.who.int/news-room/fact-sheets?x=1").as_deref(),
            Some("https://www.google.com/s2/favicons?domain=www.who.int&sz=32")
        );
        assert_eq!(hostname("http://A.com/path").as_deref(), Some("a.com"));
    }

    #[test]
    fn invalid_uris_hide_the_icon() {
        assert_eq!(favicon_url("not a url"), None);
        assert_eq!(favicon_url("mailto:someone@example.com"), None);
        assert_eq!(hostname(""), None);
    }
}
