//! Session provider backed by a cookie-keeping reqwest client
//!
//! Pages are fetched and parsed with `scraper`; JavaScript is not executed.
//! JSON endpoints are exposed inside a `<pre>` element, which is what the
//! portal's `?ajax=1` document listings look like in a browser.

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use scraper::Html;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::{
    check_not_logged_out, parse_cookie_header, parse_selector, parse_url,
    CookieRecord, RenderedPage, SessionProvider,
};
use crate::config::{Config, Credentials};
use crate::errors::HarvestError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
    timeout: Duration,
    page: Option<RenderedPage>,
}

/// Fields scraped from the login page
#[derive(Debug, Clone, PartialEq)]
struct LoginForm {
    action: Url,
    username_field: String,
    password_field: String,
    hidden: Vec<(String, String)>,
}

impl HttpSession {
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let base_url = parse_url(&format!("{}/", config.base_url))?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(config.http_timeout())
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            base_url,
            timeout: config.http_timeout(),
            page: None,
        })
    }

    /// Submit the portal's login form and confirm we left the login page
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), HarvestError> {
        let login_url = self
            .base_url
            .join("login")
            .map_err(|source| HarvestError::Url {
                url: format!("{}login", self.base_url),
                source,
            })?;

        info!("Logging in at {}", login_url);
        let login_page = self
            .load(self.client.get(login_url.clone()), login_url.as_str())
            .await
            .map_err(|e| HarvestError::Auth(format!("cannot open login page: {}", e)))?;

        let form = parse_login_form(&login_page)?;
        let mut fields = form.hidden.clone();
        fields.push((form.username_field.clone(), credentials.username.clone()));
        fields.push((form.password_field.clone(), credentials.password.clone()));

        debug!("Posting login form to {}", form.action);
        let page = self
            .load(self.client.post(form.action.clone()).form(&fields), form.action.as_str())
            .await
            .map_err(|e| HarvestError::Auth(format!("login request failed: {}", e)))?;

        if page.is_login_page() {
            return Err(HarvestError::Auth(
                "portal returned to the login page; check USERNAME and PASSWORD".into(),
            ));
        }

        info!("Logged in, landed on {}", page.url);
        self.page = Some(page);
        Ok(())
    }

    async fn load(&self, request: RequestBuilder, requested: &str) -> Result<RenderedPage, HarvestError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e, requested))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Status {
                status: status.as_u16(),
                url: requested.to_string(),
            });
        }

        let final_url = response.url().clone();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, requested))?;

        let page = match is_html {
            Some(true) => RenderedPage::html(final_url, body),
            Some(false) => RenderedPage::text_payload(final_url, &body),
            None if looks_like_json(&body) => RenderedPage::text_payload(final_url, &body),
            None => RenderedPage::html(final_url, body),
        };
        Ok(page)
    }

    fn transport_error(&self, e: reqwest::Error, url: &str) -> HarvestError {
        if e.is_timeout() {
            HarvestError::Timeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            HarvestError::Http(e)
        }
    }
}

#[async_trait]
impl SessionProvider for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        debug!("Navigating to {}", url);
        let target = parse_url(url)?;
        let page = self.load(self.client.get(target), url).await?;
        check_not_logged_out(url, &page)?;
        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Option<&RenderedPage> {
        self.page.as_ref()
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), HarvestError> {
        parse_selector(selector)?;
        let deadline = Instant::now() + timeout;
        let mut previous_body: Option<String> = None;

        loop {
            let page = self.page.as_ref().ok_or(HarvestError::NoPage)?;
            if page.contains(selector)? {
                return Ok(());
            }

            // Nothing runs client-side: a body that did not change on re-fetch never will
            let unchanged = previous_body.as_deref() == Some(page.body.as_str());
            let now = Instant::now();
            if unchanged || now >= deadline {
                return Err(HarvestError::ElementMissing {
                    selector: selector.to_string(),
                    url: page.url.to_string(),
                    seconds: timeout.as_secs(),
                });
            }

            previous_body = Some(page.body.clone());
            let url = page.url.to_string();
            tokio::time::sleep(WAIT_POLL_INTERVAL.min(deadline - now)).await;
            self.navigate(&url).await?;
        }
    }

    fn cookies(&self) -> Vec<CookieRecord> {
        let domain = self.base_url.host_str();
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(|h| parse_cookie_header(h, domain)))
            .unwrap_or_default()
    }
}

fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn parse_login_form(page: &RenderedPage) -> Result<LoginForm, HarvestError> {
    let document = Html::parse_document(&page.body);
    let form_selector = parse_selector("form")?;
    let password_selector = parse_selector("#password, input[type=password]")?;
    let username_selector = parse_selector("#username")?;
    let hidden_selector = parse_selector("input[type=hidden]")?;

    let form = document
        .select(&form_selector)
        .find(|form| form.select(&password_selector).next().is_some())
        .ok_or_else(|| HarvestError::Auth(format!("no login form found on {}", page.url)))?;

    let field_name = |selector: &scraper::Selector, fallback: &str| {
        form.select(selector)
            .next()
            .and_then(|input| input.value().attr("name"))
            .unwrap_or(fallback)
            .to_string()
    };
    let username_field = field_name(&username_selector, "username");
    let password_field = field_name(&password_selector, "password");

    let hidden = form
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    let action = match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => {
            page.url.join(action).map_err(|source| HarvestError::Url {
                url: action.to_string(),
                source,
            })?
        }
        _ => page.url.clone(),
    };

    Ok(LoginForm {
        action,
        username_field,
        password_field,
        hidden,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{CannedResponse, RecordedRequest, TestServer};

    const LOGIN_FORM: &str = r#"<html><body>
        <form method="POST" action="/login">
            <input type="hidden" name="_token" value="tok123">
            <input id="username" name="email" type="text">
            <input id="password" name="secret" type="password">
        </form>
    </body></html>"#;

    fn portal(request: &RecordedRequest) -> CannedResponse {
        match (request.method.as_str(), request.path()) {
            ("GET", "/login") => CannedResponse::html(LOGIN_FORM),
            ("POST", "/login") if request.body.contains("secret=hunter2") => {
                CannedResponse::redirect("/dashboard")
                    .header("Set-Cookie", "portal_session=s3cr3t; Path=/; HttpOnly")
            }
            ("POST", "/login") => CannedResponse::redirect("/login"),
            ("GET", "/dashboard") => CannedResponse::html("<h1>Dashboard</h1>"),
            ("GET", "/report/1/document") => CannedResponse::json(
                r#"{"data": [{"basename": "rekap <OMSET>.pdf", "url": "/files/1"}]}"#,
            ),
            ("GET", "/report/2") => CannedResponse::redirect("/login"),
            ("GET", "/report/3") => CannedResponse::html("<h1>Report 3</h1>"),
            _ => CannedResponse::new(404, "not found"),
        }
    }

    fn config_for(base_url: &str) -> Config {
        let base_url = base_url.to_string();
        Config::from_lookup(move |key| match key {
            "BASE_URL" => Some(base_url.clone()),
            "HARVEST_TIMEOUT_SECONDS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn credentials(password: &str) -> Credentials {
        Credentials {
            username: "operator".to_string(),
            password: password.to_string(),
        }
    }

    fn login_page(body: &str) -> RenderedPage {
        RenderedPage::html(Url::parse("https://portal.test/login").unwrap(), body)
    }

    #[test]
    fn test_parse_login_form_with_csrf_token() {
        let page = login_page(
            r#"<html><body>
                <form id="search" action="/search"><input name="q"></form>
                <form method="POST" action="/login">
                    <input type="hidden" name="_token" value="tok123">
                    <input id="username" name="email" type="text">
                    <input id="password" name="secret" type="password">
                    <button type="submit">Login</button>
                </form>
            </body></html>"#,
        );

        let form = parse_login_form(&page).unwrap();
        assert_eq!(form.action.as_str(), "https://portal.test/login");
        assert_eq!(form.username_field, "email");
        assert_eq!(form.password_field, "secret");
        assert_eq!(form.hidden, vec![("_token".to_string(), "tok123".to_string())]);
    }

    #[test]
    fn test_parse_login_form_defaults() {
        let page = login_page(r#"<form><input id="username"><input id="password"></form>"#);
        let form = parse_login_form(&page).unwrap();
        assert_eq!(form.action, page.url);
        assert_eq!(form.username_field, "username");
        assert_eq!(form.password_field, "password");
        assert!(form.hidden.is_empty());
    }

    #[test]
    fn test_missing_login_form_is_auth_error() {
        let page = login_page("<p>maintenance</p>");
        assert!(matches!(parse_login_form(&page), Err(HarvestError::Auth(_))));
    }

    #[test]
    fn test_json_sniffing() {
        assert!(looks_like_json("  {\"data\": []}"));
        assert!(looks_like_json("[]"));
        assert!(!looks_like_json("<html></html>"));
    }

    #[test]
    fn test_new_session_has_no_page_or_cookies() {
        let config = Config::from_lookup(|key| match key {
            "BASE_URL" => Some("https://portal.test".to_string()),
            _ => None,
        })
        .unwrap();
        let session = HttpSession::new(&config).unwrap();
        assert!(session.page().is_none());
        assert!(session.cookies().is_empty());
        assert!(matches!(session.anchor_hrefs(), Err(HarvestError::NoPage)));
    }

    #[tokio::test]
    async fn test_login_posts_form_and_captures_cookies() {
        let server = TestServer::start(portal).await;
        let mut session = HttpSession::new(&config_for(&server.base_url)).unwrap();

        session.login(&credentials("hunter2")).await.unwrap();
        assert_eq!(session.current_url(), Some(server.url("/dashboard")));

        let cookies = session.cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "portal_session");
        assert_eq!(cookies[0].value, "s3cr3t");

        let requests = server.requests();
        let post = requests.iter().find(|r| r.method == "POST").unwrap();
        assert!(post.body.contains("_token=tok123"));
        assert!(post.body.contains("email=operator"));

        let dashboard = requests.iter().find(|r| r.path() == "/dashboard").unwrap();
        assert_eq!(dashboard.header("cookie"), Some("portal_session=s3cr3t"));
    }

    #[tokio::test]
    async fn test_login_bounced_to_login_page_is_auth_error() {
        let server = TestServer::start(portal).await;
        let mut session = HttpSession::new(&config_for(&server.base_url)).unwrap();

        let err = session.login(&credentials("wrong")).await.unwrap_err();
        assert!(matches!(err, HarvestError::Auth(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(session.cookies().is_empty());
    }

    #[tokio::test]
    async fn test_json_listing_is_exposed_inside_pre() {
        let server = TestServer::start(portal).await;
        let mut session = HttpSession::new(&config_for(&server.base_url)).unwrap();

        session
            .navigate(&server.url("/report/1/document?ajax=1"))
            .await
            .unwrap();
        session.wait_for("pre", Duration::from_secs(5)).await.unwrap();

        let text = session.text_of("pre").unwrap().unwrap();
        let listing: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(listing["data"][0]["basename"], "rekap <OMSET>.pdf");
        assert_eq!(server.hits("/report/1/document"), 1);
    }

    #[tokio::test]
    async fn test_redirect_to_login_is_session_expiry() {
        let server = TestServer::start(portal).await;
        let mut session = HttpSession::new(&config_for(&server.base_url)).unwrap();

        let err = session.navigate(&server.url("/report/2")).await.unwrap_err();
        assert!(matches!(err, HarvestError::SessionExpired(_)));

        let missing = session.navigate(&server.url("/report/99")).await.unwrap_err();
        assert!(matches!(missing, HarvestError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_wait_for_gives_up_on_static_page_after_one_refetch() {
        let server = TestServer::start(portal).await;
        let mut session = HttpSession::new(&config_for(&server.base_url)).unwrap();
        session.navigate(&server.url("/report/3")).await.unwrap();

        let started = Instant::now();
        let err = session
            .wait_for("pre", Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::ElementMissing { .. }));
        assert_eq!(server.hits("/report/3"), 2);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
