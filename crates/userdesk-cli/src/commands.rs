//! CLI commands

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use userdesk_core::api::ApiClient;
use userdesk_core::auth::{
    ChannelNavigator, CredentialStore, FileCredentialStore, KeyringCredentialStore, LoginRedirect,
};
use userdesk_core::config::CredentialBackend;
use userdesk_core::models::{RegisterRequest, Role, User, UserUpdate};
use userdesk_core::Config;

/// Keychain account used before anyone has logged in.
const DEFAULT_KEYRING_ACCOUNT: &str = "default";

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        /// Account email (defaults to the last one used)
        #[arg(long)]
        email: Option<String>,
    },

    /// Create a new account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        city: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show whether a session is stored and when it expires
    Status,

    /// Show your profile
    Profile,

    /// Update your own profile
    ProfileUpdate {
        #[command(flatten)]
        fields: UpdateFields,
    },

    /// Manage users (admin only)
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List all users
    List,

    /// Show one user
    Show { id: i64 },

    /// Update a user
    Update {
        id: i64,
        #[command(flatten)]
        fields: UpdateFields,
        /// New role (ADMIN or USER)
        #[arg(long)]
        role: Option<Role>,
    },

    /// Delete a user
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
pub struct UpdateFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    city: Option<String>,
    /// Prompt for a new password
    #[arg(long)]
    password: bool,
}

impl UpdateFields {
    fn into_update(self, role: Option<Role>) -> Result<UserUpdate> {
        let password = if self.password {
            Some(rpassword::prompt_password("New password: ")?)
        } else {
            None
        };
        let update = UserUpdate {
            name: self.name,
            email: self.email,
            city: self.city,
            role,
            password,
        };
        if update.is_empty() {
            bail!("Nothing to update - pass at least one field");
        }
        Ok(update)
    }
}

/// Everything a command needs: config, API client, and the redirect channel.
pub struct Session {
    config: Config,
    client: ApiClient,
    redirects: UnboundedReceiver<LoginRedirect>,
    json: bool,
}

impl Session {
    pub fn open(config: Config, json: bool) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match config.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::new(config.cache_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new(
                config
                    .last_email
                    .as_deref()
                    .unwrap_or(DEFAULT_KEYRING_ACCOUNT),
            )),
        };
        let (navigator, redirects) = ChannelNavigator::channel();
        let client = ApiClient::from_config(&config, store, Arc::new(navigator))?;

        Ok(Self {
            config,
            client,
            redirects,
            json,
        })
    }

    /// Tell the user to log in again if the session ended during the command.
    pub fn report_redirects(&mut self) {
        let mut last = None;
        while let Ok(redirect) = self.redirects.try_recv() {
            last = Some(redirect);
        }
        if let Some(redirect) = last {
            match redirect.return_to {
                Some(path) => eprintln!(
                    "Your session has expired (while requesting {}). Run `userdesk login` to sign in again.",
                    path
                ),
                None => eprintln!("Your session has expired. Run `userdesk login` to sign in again."),
            }
        }
    }

    fn print_user(&self, user: &User) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(user)?);
        } else {
            println!("ID:    {}", user.id);
            println!("Name:  {}", user.name);
            println!("Email: {}", user.email);
            println!("City:  {}", user.city_display());
            println!("Role:  {}", user.role);
        }
        Ok(())
    }

    fn print_users(&self, users: &[User]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(users)?);
            return Ok(());
        }
        if users.is_empty() {
            println!("No users found");
            return Ok(());
        }
        println!("{:<6} {:<24} {:<32} {:<16} {}", "ID", "NAME", "EMAIL", "CITY", "ROLE");
        for user in users {
            println!(
                "{:<6} {:<24} {:<32} {:<16} {}",
                user.id,
                user.name,
                user.email,
                user.city_display(),
                user.role
            );
        }
        Ok(())
    }

    /// Admin commands refuse to run for anyone without the ADMIN role.
    async fn require_admin(&self) -> Result<User> {
        let me = self.client.profile().await?;
        if !me.is_admin() {
            bail!("This command requires the ADMIN role (you are {})", me.role);
        }
        Ok(me)
    }

    fn require_login(&self) -> Result<()> {
        if !self.client.is_authenticated() {
            bail!("Not logged in. Run `userdesk login` first.");
        }
        Ok(())
    }
}

impl Commands {
    pub async fn execute(self, session: &mut Session) -> Result<()> {
        match self {
            Commands::Login { email } => {
                let email = match email.or_else(|| session.config.last_email.clone()) {
                    Some(email) => email,
                    None => bail!("Pass --email for the first login"),
                };
                let password = rpassword::prompt_password("Password: ")?;

                // Keychain entries are per account, so reopen for this email
                if session.config.credential_backend == CredentialBackend::Keyring {
                    let mut config = session.config.clone();
                    config.last_email = Some(email.clone());
                    *session = Session::open(config, session.json)?;
                }

                session.client.login(&email, &password).await?;

                session.config.last_email = Some(email.clone());
                if let Err(e) = session.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Logged in as {}", email);
            }

            Commands::Register { name, email, city } => {
                let password = rpassword::prompt_password("Password: ")?;
                let registration = RegisterRequest {
                    name,
                    email: email.clone(),
                    password,
                    city,
                    role: None,
                };
                match session.client.register(&registration).await? {
                    Some(user) => session.print_user(&user)?,
                    None => println!("Registered {}", email),
                }
            }

            Commands::Logout => {
                session.client.logout()?;
                println!("Logged out");
            }

            Commands::Status => {
                println!("API:      {}", session.config.base_url);
                match session.client.guard().current_credential() {
                    Some(credential) if credential.has_access_token() => {
                        println!("Session:  active");
                        match credential.minutes_until_expiry() {
                            Some(0) => println!("Expires:  expired (will refresh on next request)"),
                            Some(minutes) => println!("Expires:  in {} min", minutes),
                            None => println!("Expires:  unknown"),
                        }
                        let refresh = if credential.has_refresh_token() { "yes" } else { "no" };
                        println!("Refresh:  {}", refresh);
                    }
                    _ => println!("Session:  none"),
                }
            }

            Commands::Profile => {
                session.require_login()?;
                let me = session.client.profile().await?;
                session.print_user(&me)?;
            }

            Commands::ProfileUpdate { fields } => {
                session.require_login()?;
                let update = fields.into_update(None)?;
                let me = session.client.update_own_profile(&update).await?;
                session.print_user(&me)?;
            }

            Commands::Users { command } => {
                session.require_login()?;
                session.require_admin().await?;
                command.execute(session).await?;
            }
        }
        Ok(())
    }
}

impl UserCommands {
    async fn execute(self, session: &Session) -> Result<()> {
        match self {
            UserCommands::List => {
                let users = session.client.all_users().await?;
                session.print_users(&users)?;
            }

            UserCommands::Show { id } => {
                let user = session.client.user(id).await?;
                session.print_user(&user)?;
            }

            UserCommands::Update { id, fields, role } => {
                let update = fields.into_update(role)?;
                let user = session.client.update_user(id, &update).await?;
                session.print_user(&user)?;
            }

            UserCommands::Delete { id, yes } => {
                if !yes && !confirm(&format!("Delete user {}?", id))? {
                    println!("Cancelled");
                    return Ok(());
                }
                session.client.delete_user(id).await?;
                println!("Deleted user {}", id);
            }
        }
        Ok(())
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
