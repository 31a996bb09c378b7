use dotenv::dotenv;
use log::{error, info};
use reqwest::Client;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use tamarks::fetch::{fetch_course_documents, Credentials};
use tamarks::parse::parse_all;

// Entry point for the async main function, powered by tokio runtime.
#[tokio::main]
async fn main() {
    // Loads environment variables from a `.env` file, if present.
    dotenv().ok();

    // Initializes logging with simplelog to the terminal with mixed output (both stdout and stderr) and automatic color support.
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto
    ).unwrap();

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("Error reading credentials: {}", e);
            return;
        },
    };

    // One cookie-holding client per scrape; the TeachAssist session lives in it.
    let client = match Client::builder().cookie_store(true).build() {
        Ok(client) => client,
        Err(e) => {
            error!("Error building the client: {}", e);
            return;
        },
    };

    // Retrieves one report page per course from TeachAssist.
    let documents = match fetch_course_documents(&client, &credentials).await {
        Ok(documents) => {
            info!("Course reports retrieved successfully");
            documents
        },
        Err(e) => {
            error!("Error retrieving course reports: {}", e);
            return;
        },
    };

    // Parses each report into an aggregated course; a page that no longer
    // matches the layout skips that course only.
    let courses = parse_all(&documents);
    info!("Parsed {} of {} courses", courses.len(), documents.len());

    match serde_json::to_string_pretty(&courses) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Error serializing courses: {}", e),
    }
}
