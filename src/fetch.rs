use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use log::info;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

const LOGIN_URL: &str = "https://ta.yrdsb.ca/yrdsb/";
const REPORT_URL: &str = "https://ta.yrdsb.ca/live/students/viewReport.php";

/// TeachAssist account login data.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    // Reads TA_USERNAME / TA_PASSWORD, typically loaded from a .env file by
    // the caller.
    pub fn from_env() -> Result<Credentials> {
        Ok(Credentials {
            username: std::env::var("TA_USERNAME")
                .context("TA_USERNAME environment variable not found")?,
            password: std::env::var("TA_PASSWORD")
                .context("TA_PASSWORD environment variable not found")?,
        })
    }
}

// Logs in and downloads one report page per course, in course-list order.
// The client must be built with a cookie store; the session lives in its
// cookies and nowhere else.
pub async fn fetch_course_documents(
    client: &Client,
    credentials: &Credentials,
) -> Result<Vec<String>> {
    let login_data = HashMap::from([
        ("subject_id", "0"),
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("submit", "Login"),
    ]);

    let response = client
        .post(LOGIN_URL)
        .form(&login_data)
        .send()
        .await
        .context("Failed to send login request")?;

    // A successful login redirects to the report list, which carries the
    // student id in its query string.
    let student_id = student_id_from_url(response.url()).ok_or_else(|| {
        anyhow!("Authentication failed, check your credentials and try again.")
    })?;

    let course_list_html = response
        .text()
        .await
        .context("Failed to read course list response")?;
    let subject_ids = subject_ids_from_course_list(&course_list_html);
    info!("Found {} course report links", subject_ids.len());

    let mut documents = Vec::new();
    for subject_id in &subject_ids {
        let report = client
            .get(REPORT_URL)
            .query(&[
                ("subject_id", subject_id.as_str()),
                ("student_id", student_id.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to request report for subject {}", subject_id))?
            .text()
            .await
            .with_context(|| format!("Failed to read report for subject {}", subject_id))?;
        documents.push(report);
    }

    Ok(documents)
}

// Extracts the student_id query parameter from the post-login redirect URL.
fn student_id_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "student_id")
        .map(|(_, value)| value.into_owned())
}

// Every course on the report list links to its report page; the first digit
// run in each href is the subject id.
fn subject_ids_from_course_list(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("div:nth-of-type(2) div table a[href]").unwrap();
    let re = Regex::new(r"\d+").unwrap();

    document
        .select(&link_selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| re.find(href).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_id_comes_from_the_redirect_url() {
        let url =
            Url::parse("https://ta.yrdsb.ca/live/students/listReports.php?student_id=123456")
                .unwrap();
        assert_eq!(student_id_from_url(&url), Some("123456".to_string()));

        // No redirect to the report list means the login was rejected.
        let url = Url::parse("https://ta.yrdsb.ca/yrdsb/").unwrap();
        assert_eq!(student_id_from_url(&url), None);
    }

    #[test]
    fn subject_ids_come_from_the_report_links() {
        let html = r##"<html><body><div>first</div><div><div><table>
            <tr><td><a href="viewReport.php?subject_id=339121&student_id=123456">MCR3U1</a></td></tr>
            <tr><td><a href="viewReport.php?subject_id=339788&student_id=123456">ENG4U1</a></td></tr>
            <tr><td><a href="#">not a report</a></td></tr>
          </table></div></div></body></html>"##;
        assert_eq!(subject_ids_from_course_list(html), vec!["339121", "339788"]);
    }
}
