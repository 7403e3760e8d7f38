use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::{Deserialize, Serialize};

/// Flash messages ride in a short-lived cookie between a redirect and the
/// next rendered page, then are cleared.
const FLASH_COOKIE: &str = "portal_flash";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Info,
    Success,
    Warning,
    Error,
}

impl FlashCategory {
    pub fn css_class(&self) -> &'static str {
        match self {
            FlashCategory::Info => "info",
            FlashCategory::Success => "success",
            FlashCategory::Warning => "warning",
            FlashCategory::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

/// Append a message to the pending flashes.
pub fn push(jar: CookieJar, category: FlashCategory, message: impl Into<String>) -> CookieJar {
    let mut flashes = peek(&jar);
    flashes.push(Flash {
        category,
        message: message.into(),
    });
    jar.add(flash_cookie(&flashes))
}

/// Read and clear the pending flashes.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let flashes = peek(&jar);
    let mut removal = Cookie::new(FLASH_COOKIE, "");
    removal.set_path("/");
    removal.set_max_age(CookieDuration::seconds(0));
    (jar.remove(removal), flashes)
}

fn peek(jar: &CookieJar) -> Vec<Flash> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| decode(cookie.value()))
        .unwrap_or_default()
}

fn flash_cookie(flashes: &[Flash]) -> Cookie<'static> {
    let mut cookie = Cookie::new(FLASH_COOKIE, encode(flashes));
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::minutes(5));
    cookie
}

// The JSON payload is percent-encoded so the cookie value stays within the
// characters allowed by the cookie grammar.
fn encode(flashes: &[Flash]) -> String {
    let serialized = serde_json::to_string(flashes).unwrap_or_else(|_| "[]".to_string());
    url::form_urlencoded::byte_serialize(serialized.as_bytes()).collect()
}

fn decode(value: &str) -> Option<Vec<Flash>> {
    let decoded: String = url::form_urlencoded::parse(format!("v={value}").as_bytes())
        .find(|(name, _)| name == "v")
        .map(|(_, value)| value.into_owned())?;
    serde_json::from_str(&decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_flashes_are_taken_once() {
        let jar = CookieJar::new();
        let jar = push(jar, FlashCategory::Success, "Package has been created.");
        let jar = push(jar, FlashCategory::Error, "title: field required");

        let (jar, flashes) = take(jar);
        assert_eq!(
            flashes,
            vec![
                Flash {
                    category: FlashCategory::Success,
                    message: "Package has been created.".to_string(),
                },
                Flash {
                    category: FlashCategory::Error,
                    message: "title: field required".to_string(),
                },
            ]
        );

        // taking again yields nothing: the cookie was cleared
        let (_jar, flashes) = take(jar);
        assert!(flashes.is_empty());
    }

    #[test]
    fn messages_with_cookie_delimiters_survive_the_round_trip() {
        let jar = push(
            CookieJar::new(),
            FlashCategory::Warning,
            r#"doi: Expecting "10.NNNN/suffix"; got something else"#,
        );
        let (_jar, flashes) = take(jar);
        assert_eq!(
            flashes[0].message,
            r#"doi: Expecting "10.NNNN/suffix"; got something else"#
        );
    }
}
