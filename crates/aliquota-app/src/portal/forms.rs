//! Hidden-field and validation-block extraction from portal pages.

use scraper::{ElementRef, Html, Selector};

use super::PortalError;

/// ASP.NET anti-forgery field echoed back on every form submission.
pub const ANTI_FORGERY_FIELD: &str = "__RequestVerificationToken";

const VALIDATION_BLOCKS: &str = ".text-danger, .alert-danger, .validation-summary-errors";

/// Extract the anti-forgery token from a page. A missing or empty token is
/// fatal: it means the portal markup changed and nothing downstream can be
/// trusted.
pub fn anti_forgery_token(html: &str, stage: &'static str) -> Result<String, PortalError> {
    field_values(html, ANTI_FORGERY_FIELD)?
        .into_iter()
        .find(|value| !value.is_empty())
        .ok_or(PortalError::TokenMissing { stage })
}

/// Values of every `<input>` with the given name, in document order.
pub fn field_values(html: &str, name: &str) -> Result<Vec<String>, PortalError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&format!(r#"input[name="{name}"]"#))
        .map_err(|err| PortalError::parse("form", err.to_string()))?;
    Ok(document
        .select(&selector)
        .filter_map(|node| node.value().attr("value"))
        .map(str::to_string)
        .collect())
}

/// Non-empty text of the portal's validation-error blocks.
pub fn validation_errors(html: &str) -> Result<Vec<String>, PortalError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(VALIDATION_BLOCKS)
        .map_err(|err| PortalError::parse("form", err.to_string()))?;
    Ok(document
        .select(&selector)
        .map(|node| text_content(&node))
        .filter(|text| !text.is_empty())
        .collect())
}

pub(crate) fn text_content(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
          <form action="/Usuario/Login" method="post">
            <input name="__RequestVerificationToken" type="hidden" value="tok-123" />
            <input name="Email" type="text" />
          </form>
        </body></html>
    "#;

    #[test]
    fn token_is_extracted() {
        let token = anti_forgery_token(LOGIN_PAGE, "login").expect("token");
        assert_eq!(token, "tok-123");
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = anti_forgery_token("<html><body></body></html>", "login").unwrap_err();
        assert!(matches!(err, PortalError::TokenMissing { stage: "login" }));
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let html = r#"<input name="__RequestVerificationToken" value="" />"#;
        let err = anti_forgery_token(html, "request_page").unwrap_err();
        assert!(matches!(err, PortalError::TokenMissing { .. }));
    }

    #[test]
    fn field_values_preserve_document_order() {
        let html = r#"
            <input name="Estados" value="CE" />
            <input name="Estados" value="SP" />
        "#;
        assert_eq!(field_values(html, "Estados").expect("values"), vec!["CE", "SP"]);
    }

    #[test]
    fn validation_blocks_are_collected_trimmed() {
        let html = r#"
            <div class="text-danger">  CNPJ inválido  </div>
            <div class="validation-summary-errors"><ul><li>Selecione ao menos um estado</li></ul></div>
            <span class="text-danger"></span>
        "#;
        let errors = validation_errors(html).expect("errors");
        assert_eq!(
            errors,
            vec!["CNPJ inválido", "Selecione ao menos um estado"]
        );
    }
}
