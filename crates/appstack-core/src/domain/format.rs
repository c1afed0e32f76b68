//! Pure formatting of derived artifacts.
//!
//! Every function here is a plain string interpolation with no hidden state:
//! identical inputs always give identical output.

use super::sas::SasRequest;

/// `/blob/{account}/{container}`
pub fn canonical_resource(account: &str, container: &str) -> String {
    format!("/blob/{account}/{container}")
}

/// `https://{account}.blob.core.windows.net/{container}/{blob}?{token}`
pub fn signed_blob_url(request: &SasRequest, token: &str) -> String {
    format!(
        "https://{}.blob.core.windows.net/{}/{}?{}",
        request.account_name, request.container_name, request.blob_name, token
    )
}

/// Prefix a resolved host name with `https://`.
pub fn endpoint_url(host_name: &str) -> String {
    format!("https://{host_name}")
}

pub fn insights_connection_string(instrumentation_key: &str) -> String {
    format!("InstrumentationKey={instrumentation_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sas::ValidityWindow;
    use rstest::rstest;

    #[rstest]
    #[case("appservicesa", "appservice-c", "appservice-b", "appservicerg", "sv=2015-04-05&sig=abc")]
    #[case("acct", "c", "app.zip", "rg-2", "")]
    #[case("a1", "container-x", "nested.blob", "rg", "st=2021-01-01&se=2030-01-01")]
    fn signed_url_has_exact_shape(
        #[case] account: &str,
        #[case] container: &str,
        #[case] blob: &str,
        #[case] group: &str,
        #[case] token: &str,
    ) {
        let req = SasRequest::for_blob(account, container, blob, group, ValidityWindow::default());
        assert_eq!(
            signed_blob_url(&req, token),
            format!("https://{account}.blob.core.windows.net/{container}/{blob}?{token}")
        );
    }

    #[test]
    fn endpoint_is_prefixed_with_https() {
        assert_eq!(
            endpoint_url("myapp.azurewebsites.net"),
            "https://myapp.azurewebsites.net"
        );
    }

    #[test]
    fn insights_connection_string_wraps_key() {
        assert_eq!(
            insights_connection_string("0000-1111"),
            "InstrumentationKey=0000-1111"
        );
    }

    #[test]
    fn formatting_is_idempotent() {
        let req = SasRequest::for_blob("a", "b", "c", "d", ValidityWindow::default());
        assert_eq!(signed_blob_url(&req, "t"), signed_blob_url(&req, "t"));
        assert_eq!(endpoint_url("h"), endpoint_url("h"));
        assert_eq!(canonical_resource("a", "b"), "/blob/a/b");
    }
}
