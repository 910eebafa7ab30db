use clap::Subcommand;

use super::{build, print_json};

#[derive(Subcommand)]
pub enum ContactAction {
    /// List a user's trusted contacts in notification order
    List {
        #[arg(long)]
        user: i64,
    },
    /// Dev plumbing: insert a contact row. Contact management is owned by
    /// the external contacts service in production.
    Seed {
        #[arg(long)]
        user: i64,
        phone: String,
    },
}

pub fn run(action: ContactAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = build()?;
    match action {
        ContactAction::List { user } => {
            let contacts = {
                let db = app.db.lock().unwrap();
                db.trusted_contacts(user)?
            };
            print_json(&contacts)?;
        }
        ContactAction::Seed { user, phone } => {
            let contact = {
                let db = app.db.lock().unwrap();
                db.insert_contact(user, &phone, chrono::Utc::now())?
            };
            print_json(&contact)?;
        }
    }
    Ok(())
}
