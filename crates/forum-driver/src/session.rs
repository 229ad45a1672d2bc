//! Login walk: fetch the login page, replay its form fields with our
//! credentials, and verify the session actually authenticated.

use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::client::GatewayClient;
use crate::config::{Credentials, SiteConfig};
use crate::{DriverError, Result};

/// Parse a configured CSS selector.
pub(crate) fn sel(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| DriverError::Site(format!("invalid selector '{selector}': {e}")))
}

/// Sign the session in. The cookie jar inside `client` carries the
/// authenticated state afterwards.
pub async fn login(
    client: &GatewayClient,
    config: &SiteConfig,
    credentials: &Credentials,
) -> Result<()> {
    let login_url = config.login_url();
    let page = client.fetch(&login_url).await?;

    let mut form = parse_login_form(&page, config)?;
    form.retain(|(name, _)| name != "username" && name != "password");
    form.push(("username".into(), credentials.username.clone()));
    form.push(("password".into(), credentials.password.clone()));
    debug!(fields = form.len(), "submitting login form");

    let after = client.post_form(&login_url, &config.base_url, &form).await?;
    if after.contains(&config.logout_marker) {
        info!("forum login succeeded");
        return Ok(());
    }
    Err(DriverError::Auth(login_failure_reason(&after, config)?))
}

/// Collect every named input and button of the login form, hidden
/// anti-forgery tokens included, in document order.
fn parse_login_form(html: &str, config: &SiteConfig) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(html);
    let form_sel = sel(&config.selectors.login_form)?;
    let field_sel = sel("input[name], button[name]")
        .expect("static field selector is valid");

    let form = document
        .select(&form_sel)
        .next()
        .ok_or_else(|| DriverError::Site("login form not found on the login page".into()))?;

    Ok(form
        .select(&field_sel)
        .map(|field| {
            (
                field.value().attr("name").unwrap_or_default().to_string(),
                field.value().attr("value").unwrap_or_default().to_string(),
            )
        })
        .collect())
}

/// The site's own error box, when it rendered one.
fn login_failure_reason(html: &str, config: &SiteConfig) -> Result<String> {
    let document = Html::parse_document(html);
    let error_sel = sel(&config.selectors.error_box)?;
    let reason = document
        .select(&error_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "login rejected with no error message".into());
    Ok(reason)
}

// ─── Tests ────────────────────────────────────────────────────────────────
