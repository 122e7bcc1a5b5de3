//! Attest CLI
//!
//! Usage:
//!   attest profile <TOKEN>      - Decrypt and verify a token, print the profile
//!   attest aml ...              - Run an AML check
//!   attest share ...            - Create a share URL for a dynamic scenario
//!   attest sandbox-token ...    - Issue a local sandbox token
//!   attest keygen               - Create development keys

mod http;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attest_core::sandbox::SandboxAttribute;
use attest_core::{
    AmlProfile, AttestClient, ClientConfig, DynamicPolicy, DynamicScenario, SandboxIssuer,
    SandboxTokenRequest,
};
use attest_crypto::{KeyStore, RecipientKey, ServiceSigner};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::http::HttpTransport;

#[derive(Parser)]
#[command(name = "attest")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Verified identity profiles from encrypted share tokens", long_about = None)]
struct Cli {
    /// Config file (defaults to $ATTEST_CONFIG or ~/.attest/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt and verify a token, print the activity details as JSON
    Profile {
        /// Encrypted single-use token
        token: String,
    },

    /// Run an AML check
    Aml {
        #[arg(long)]
        given_names: String,
        #[arg(long)]
        family_name: String,
        /// ISO 3166-1 alpha-3 country code
        #[arg(long)]
        country: String,
        #[arg(long)]
        post_code: Option<String>,
        #[arg(long)]
        ssn: Option<String>,
    },

    /// Create a share URL for a dynamic scenario
    Share {
        /// Where the service redirects once the user has shared
        #[arg(long)]
        callback: String,
        /// Attribute to request (repeatable)
        #[arg(long = "want")]
        wanted: Vec<String>,
        /// Request an age_over:<N> check
        #[arg(long)]
        age_over: Option<u32>,
        #[arg(long)]
        selfie_auth: bool,
        #[arg(long)]
        pin_auth: bool,
        #[arg(long)]
        remember_me: bool,
    },

    /// Issue a sandbox token sealed to a recipient key
    SandboxToken {
        /// Recipient public (or private) key, PEM
        #[arg(long)]
        recipient_key: PathBuf,
        /// Service Ed25519 signing key, PKCS#8 DER
        #[arg(long)]
        signing_key: PathBuf,
        #[arg(long)]
        remember_me_id: Option<String>,
        /// name=value attribute (repeatable)
        #[arg(long = "attr")]
        attributes: Vec<String>,
        /// Date of birth, YYYY-MM-DD
        #[arg(long)]
        date_of_birth: Option<NaiveDate>,
    },

    /// Create a development RSA key pair and service signing key
    Keygen {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 2048)]
        bits: usize,
    },
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(p) => ClientConfig::from_file(p),
        None => ClientConfig::load(),
    }
    .context("Failed to load configuration")
}

fn build_client(config: &ClientConfig) -> Result<AttestClient<HttpTransport>> {
    let transport = HttpTransport::new(&config.api_url, &config.sdk_id)?;
    Ok(AttestClient::from_config(config, transport)?)
}

fn read_recipient(path: &Path) -> Result<RecipientKey> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if pem.contains("PRIVATE KEY") {
        return Ok(KeyStore::from_pem(&pem)?.recipient_key());
    }
    Ok(RecipientKey::from_pem(&pem)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Profile { token } => {
            let config = load_config(cli.config.as_deref())?;
            let client = build_client(&config)?;
            let details = client.retrieve_profile(&token)?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }

        Commands::Aml {
            given_names,
            family_name,
            country,
            post_code,
            ssn,
        } => {
            let mut builder = AmlProfile::builder()
                .with_given_names(given_names)
                .with_family_name(family_name)
                .with_country(country);
            if let Some(post_code) = post_code {
                builder = builder.with_post_code(post_code);
            }
            if let Some(ssn) = ssn {
                builder = builder.with_ssn(ssn);
            }
            let profile = builder.build()?;

            let config = load_config(cli.config.as_deref())?;
            let result = build_client(&config)?.perform_aml_check(&profile).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Share {
            callback,
            wanted,
            age_over,
            selfie_auth,
            pin_auth,
            remember_me,
        } => {
            let mut policy = DynamicPolicy::builder()
                .with_selfie_auth(selfie_auth)
                .with_pin_auth(pin_auth)
                .with_remember_me_id(remember_me);
            for name in &wanted {
                policy = policy.with_attribute(name, false);
            }
            if let Some(age) = age_over {
                policy = policy.with_age_over(age, false);
            }
            let scenario = DynamicScenario::builder()
                .with_callback_endpoint(callback)
                .with_policy(policy.build())
                .build()?;

            let config = load_config(cli.config.as_deref())?;
            let result = build_client(&config)?.create_share_url(&scenario).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::SandboxToken {
            recipient_key,
            signing_key,
            remember_me_id,
            attributes,
            date_of_birth,
        } => {
            let recipient = read_recipient(&recipient_key)?;
            let pkcs8 = fs::read(&signing_key)
                .with_context(|| format!("Failed to read {}", signing_key.display()))?;
            let signer = ServiceSigner::from_pkcs8(&pkcs8)?;

            let mut request = SandboxTokenRequest::builder();
            if let Some(id) = remember_me_id {
                request = request.with_remember_me_id(id);
            }
            if let Some(dob) = date_of_birth {
                request = request.with_date_of_birth(dob);
            }
            for pair in &attributes {
                let (name, value) = pair
                    .split_once('=')
                    .with_context(|| format!("Expected name=value, got '{pair}'"))?;
                request = request.with_attribute(SandboxAttribute::new(name, value));
            }

            let token = SandboxIssuer::new(recipient, signer).issue(&request.build())?;
            println!("{token}");
        }

        Commands::Keygen { out_dir, bits } => {
            fs::create_dir_all(&out_dir)?;
            let keys = KeyStore::generate(bits)?;
            let (signer, pkcs8) = ServiceSigner::generate()?;

            fs::write(out_dir.join("private.pem"), keys.to_pem()?.as_bytes())?;
            fs::write(out_dir.join("public.pem"), keys.recipient_key().to_pem()?)?;
            fs::write(out_dir.join("service.pk8"), pkcs8.as_slice())?;
            info!(fingerprint = keys.fingerprint(), "keys written");

            println!("Recipient key fingerprint: {}", keys.fingerprint());
            println!(
                "Service public key:        {}",
                signer.verifying_key().to_hex()
            );
        }
    }

    Ok(())
}
