use axum::http::HeaderMap;

use crate::{
    geo::GeoInfo,
    models::{Browser, ClickData, DeviceType},
};

const BOT_TOKENS: &[&str] = &["bot", "crawler", "spider", "crawling"];
const TABLET_TOKENS: &[&str] = &["tablet", "ipad", "playbook", "silk"];
const MOBILE_TOKENS: &[&str] = &[
    "mobile",
    "android",
    "iphone",
    "ipod",
    "blackberry",
    "opera mini",
    "iemobile",
];

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Collect the metadata stored with a click.
///
/// `geo` is the resolved location of the visitor, when one is available; the
/// proxy's `CF-IPCountry` / `CF-IPCity` headers fill in whatever it lacks.
pub fn parse_click_data(headers: &HeaderMap, geo: Option<&GeoInfo>) -> ClickData {
    let user_agent = header(headers, "user-agent").unwrap_or_default().to_owned();
    let referrer = header(headers, "referer").unwrap_or_default().to_owned();

    let country = geo
        .map(|g| g.country.as_str())
        .filter(|c| !c.is_empty())
        .or_else(|| header(headers, "cf-ipcountry"))
        .unwrap_or_default()
        .to_owned();
    let city = geo
        .map(|g| g.city.as_str())
        .filter(|c| !c.is_empty())
        .or_else(|| header(headers, "cf-ipcity"))
        .unwrap_or_default()
        .to_owned();

    ClickData {
        device_type: device_type(&user_agent),
        browser: browser(&user_agent),
        user_agent,
        referrer,
        country,
        city,
    }
}

/// Classify the device behind a User-Agent.
///
/// Crawlers and tablets are tested before the generic mobile tokens: iPad and
/// mobile-crawler UAs also carry "Mobile" and must not land in that bucket.
pub fn device_type(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_lowercase();

    if contains_any(&ua, BOT_TOKENS) {
        DeviceType::Bot
    } else if contains_any(&ua, TABLET_TOKENS) {
        DeviceType::Tablet
    } else if contains_any(&ua, MOBILE_TOKENS) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

/// Classify the browser family behind a User-Agent. Order matters: Edge and
/// Opera UAs embed "Chrome", and Chrome UAs embed "Safari".
pub fn browser(user_agent: &str) -> Browser {
    let ua = user_agent.to_lowercase();

    if ua.contains("edg") {
        Browser::Edge
    } else if ua.contains("chrome") {
        Browser::Chrome
    } else if ua.contains("safari") {
        Browser::Safari
    } else if ua.contains("firefox") {
        Browser::Firefox
    } else if ua.contains("opera") || ua.contains("opr") {
        Browser::Opera
    } else if ua.contains("msie") || ua.contains("trident") {
        Browser::Ie
    } else {
        Browser::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 13_2 like Mac OS X) AppleWebKit/605.1.15 \
                        (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                          AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const CHROME: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const IE11: &str = "Mozilla/5.0 (Windows NT 10.0; Trident/7.0; rv:11.0) like Gecko";

    #[test]
    fn device_classes() {
        assert_eq!(device_type(GOOGLEBOT), DeviceType::Bot);
        assert_eq!(device_type(IPAD), DeviceType::Tablet);
        assert_eq!(device_type(IPHONE), DeviceType::Mobile);
        assert_eq!(device_type(CHROME), DeviceType::Desktop);
        assert_eq!(device_type(""), DeviceType::Desktop);
    }

    #[test]
    fn browser_precedence() {
        assert_eq!(browser(EDGE), Browser::Edge);
        assert_eq!(browser(CHROME), Browser::Chrome);
        assert_eq!(browser(IPHONE), Browser::Safari);
        assert_eq!(browser(FIREFOX), Browser::Firefox);
        assert_eq!(browser(IE11), Browser::Ie);
        assert_eq!(browser("curl/8.4.0"), Browser::Other);
    }

    #[test]
    fn geo_context_wins_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static(FIREFOX));
        headers.insert("referer", HeaderValue::from_static("https://news.example/"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("DE"));
        headers.insert("cf-ipcity", HeaderValue::from_static("Berlin"));

        let from_headers = parse_click_data(&headers, None);
        assert_eq!(from_headers.country, "DE");
        assert_eq!(from_headers.city, "Berlin");
        assert_eq!(from_headers.referrer, "https://news.example/");
        assert_eq!(from_headers.browser, Browser::Firefox);
        assert_eq!(from_headers.device_type, DeviceType::Desktop);

        let geo = GeoInfo {
            country: "France".into(),
            city: "Lyon".into(),
        };
        let from_geo = parse_click_data(&headers, Some(&geo));
        assert_eq!(from_geo.country, "France");
        assert_eq!(from_geo.city, "Lyon");
    }

    #[test]
    fn missing_headers_become_empty_strings() {
        let data = parse_click_data(&HeaderMap::new(), None);
        assert_eq!(data.user_agent, "");
        assert_eq!(data.referrer, "");
        assert_eq!(data.country, "");
        assert_eq!(data.city, "");
        assert_eq!(data.browser, Browser::Other);
    }
}
