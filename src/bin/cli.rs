use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;

#[derive(Parser)]
#[command(name = "lms-cli")]
#[command(about = "CLI for the LMS API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Courses,
    CreateCourse {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    Lessons,
    CreateLesson {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long)]
        course: Option<u64>,
    },
    Payments {
        #[arg(long)]
        paid_course: Option<u64>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        ordering: Option<String>,
    },
    Pay {
        #[arg(long)]
        card_number: String,
        #[arg(long)]
        exp_month: String,
        #[arg(long)]
        exp_year: String,
        #[arg(long)]
        cvc: String,
    },
    Subscribe {
        #[arg(short, long)]
        course: u64,
    },
    Unsubscribe {
        #[arg(short, long)]
        id: u64,
    },
}

const TOKEN_FILE: &str = ".lms_token";

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn load_token() -> Result<String, Box<dyn std::error::Error>> {
    Ok(fs::read_to_string(TOKEN_FILE)?.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Register { username, password } => {
            let resp = client
                .post(format!("{}/register", cli.url))
                .json(&json!({"username": username, "password": password}))
                .send()
                .await?;
            println!("{}: {}", resp.status(), resp.text().await?);
        }
        Commands::Login { username, password } => {
            let resp = client
                .post(format!("{}/login", cli.url))
                .json(&json!({"username": username, "password": password}))
                .send()
                .await?;
            if resp.status().is_success() {
                let body: LoginResponse = resp.json().await?;
                fs::write(TOKEN_FILE, &body.token)?;
                println!("Logged in; token saved to {}", TOKEN_FILE);
            } else {
                println!("Login failed: {}", resp.status());
            }
        }
        Commands::Courses => {
            let resp = client
                .get(format!("{}/course/", cli.url))
                .bearer_auth(load_token()?)
                .send()
                .await?;
            println!("{}", resp.text().await?);
        }
        Commands::CreateCourse { title, description } => {
            let resp = client
                .post(format!("{}/course/", cli.url))
                .bearer_auth(load_token()?)
                .json(&json!({"title": title, "description": description}))
                .send()
                .await?;
            println!("{}: {}", resp.status(), resp.text().await?);
        }
        Commands::Lessons => {
            let resp = client
                .get(format!("{}/lesson/", cli.url))
                .bearer_auth(load_token()?)
                .send()
                .await?;
            println!("{}", resp.text().await?);
        }
        Commands::CreateLesson {
            title,
            description,
            course,
        } => {
            let resp = client
                .post(format!("{}/lesson/create/", cli.url))
                .bearer_auth(load_token()?)
                .json(&json!({"title": title, "description": description, "course": course}))
                .send()
                .await?;
            println!("{}: {}", resp.status(), resp.text().await?);
        }
        Commands::Payments {
            paid_course,
            method,
            ordering,
        } => {
            let mut query: Vec<(String, String)> = Vec::new();
            if let Some(c) = paid_course {
                query.push(("paid_course".to_string(), c.to_string()));
            }
            if let Some(m) = method {
                query.push(("payment_method".to_string(), m));
            }
            if let Some(o) = ordering {
                query.push(("ordering".to_string(), o));
            }
            let resp = client
                .get(format!("{}/payments", cli.url))
                .query(&query)
                .bearer_auth(load_token()?)
                .send()
                .await?;
            println!("{}", resp.text().await?);
        }
        Commands::Pay {
            card_number,
            exp_month,
            exp_year,
            cvc,
        } => {
            let resp = client
                .post(format!("{}/payments/create/", cli.url))
                .bearer_auth(load_token()?)
                .json(&json!({
                    "card_number": card_number,
                    "card_exp_month": exp_month,
                    "card_exp_year": exp_year,
                    "card_cvc": cvc,
                }))
                .send()
                .await?;
            println!("{}: {}", resp.status(), resp.text().await?);
        }
        Commands::Subscribe { course } => {
            let resp = client
                .post(format!("{}/subscription/create/", cli.url))
                .bearer_auth(load_token()?)
                .json(&json!({"course": course}))
                .send()
                .await?;
            println!("{}: {}", resp.status(), resp.text().await?);
        }
        Commands::Unsubscribe { id } => {
            let resp = client
                .delete(format!("{}/subscription/delete/{}/", cli.url, id))
                .bearer_auth(load_token()?)
                .send()
                .await?;
            println!("{}", resp.status());
        }
    }

    Ok(())
}
