use hub_core::Contact;
use sqlx::{PgPool, Row};

use crate::error::HubError;

fn row_to_contact(row: &sqlx::postgres::PgRow) -> Contact {
    Contact {
        owner_address: row.get("owner_address"),
        contact_address: row.get("contact_address"),
        name: row.get("name"),
        always_allowed: row.get("always_allowed"),
    }
}

/// A call is "contact-related" when either direction of the pair has an
/// entry -- matching `hub_core::Contact`'s directional-but-symmetric-intent
/// doc comment.
pub async fn is_mutual_or_either(
    pool: &PgPool,
    a: &str,
    b: &str,
) -> Result<bool, HubError> {
    let row = sqlx::query(
        r"
        SELECT EXISTS (
            SELECT 1 FROM contacts
            WHERE (owner_address = $1 AND contact_address = $2)
               OR (owner_address = $2 AND contact_address = $1)
        ) AS present
        ",
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await?;
    Ok(row.get("present"))
}

pub async fn list(pool: &PgPool, owner_address: &str) -> Result<Vec<Contact>, HubError> {
    let rows = sqlx::query("SELECT * FROM contacts WHERE owner_address = $1 ORDER BY contact_address")
        .bind(owner_address)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_contact).collect())
}

pub async fn upsert(pool: &PgPool, contact: &Contact) -> Result<(), HubError> {
    sqlx::query(
        r"
        INSERT INTO contacts (owner_address, contact_address, name, always_allowed)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (owner_address, contact_address)
        DO UPDATE SET name = EXCLUDED.name, always_allowed = EXCLUDED.always_allowed
        ",
    )
    .bind(&contact.owner_address)
    .bind(&contact.contact_address)
    .bind(&contact.name)
    .bind(contact.always_allowed)
    .execute(pool)
    .await?;
    Ok(())
}
