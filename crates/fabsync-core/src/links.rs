//! Links back into the equipment-management web UI.

use url::Url;

use crate::resource::Resource;

/// Web UI page configuring `resource`.
///
/// Only scheme, host and port of `api_url` are kept:
/// `https://fabman.io/api/v1` becomes
/// `https://fabman.io/manage/{account}/configuration/resources/{id}`.
pub fn configuration_url(api_url: &str, resource: &Resource) -> Option<String> {
    let account = resource.account_id?;
    let mut url = Url::parse(api_url).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }
    url.set_path(&format!(
        "/manage/{account}/configuration/resources/{}",
        resource.id
    ));
    url.set_query(None);
    url.set_fragment(None);
    Some(url.into())
}
