use chrono::Utc;
use crewrate_core::domain::customer::{Contact, Customer, CustomerId};
use sqlx::{sqlite::SqliteRow, Row};

use super::{timestamp_from_text, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, state_code: &str) -> Result<Customer, RepositoryError> {
        let now = Utc::now();
        let customer = Customer {
            id: CustomerId(format!("cust-{}", sqlx::types::Uuid::new_v4())),
            name: name.to_string(),
            state_code: state_code.to_string(),
            created_at: now,
        };

        sqlx::query("INSERT INTO customers (id, name, state_code, created_at) VALUES (?, ?, ?, ?)")
            .bind(&customer.id.0)
            .bind(&customer.name)
            .bind(&customer.state_code)
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(customer)
    }

    pub async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, state_code, created_at FROM customers WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, name, state_code, created_at FROM customers ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(customer_from_row).collect()
    }

    pub async fn add_contact(
        &self,
        customer_id: &CustomerId,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<Contact>, RepositoryError> {
        if self.find_by_id(customer_id).await?.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let contact = Contact {
            id: format!("contact-{}", sqlx::types::Uuid::new_v4()),
            customer_id: customer_id.clone(),
            name: name.to_string(),
            email: email.map(ToString::to_string),
            phone: phone.map(ToString::to_string),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO contacts (id, customer_id, name, email, phone, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&contact.id)
        .bind(&customer_id.0)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Some(contact))
    }

    pub async fn list_contacts(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Contact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, name, email, phone, created_at
             FROM contacts
             WHERE customer_id = ?
             ORDER BY name ASC",
        )
        .bind(&customer_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at_raw: String = row.try_get("created_at")?;
                Ok(Contact {
                    id: row.try_get("id")?,
                    customer_id: CustomerId(row.try_get("customer_id")?),
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    phone: row.try_get("phone")?,
                    created_at: timestamp_from_text("created_at", &created_at_raw)?,
                })
            })
            .collect()
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    let created_at_raw: String = row.try_get("created_at")?;
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        state_code: row.try_get("state_code")?,
        created_at: timestamp_from_text("created_at", &created_at_raw)?,
    })
}

#[cfg(test)]
mod tests {
    use crewrate_core::domain::customer::CustomerId;

    use super::SqlCustomerRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn customers_and_contacts_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlCustomerRepository::new(pool.clone());

        let customer = repo.create("Bluegrass Fabrication", "KY").await.expect("create customer");
        repo.add_contact(&customer.id, "Pat Ellis", Some("pat@bluegrassfab.test"), None)
            .await
            .expect("add contact")
            .expect("customer exists");

        let loaded = repo.find_by_id(&customer.id).await.expect("load").expect("customer exists");
        assert_eq!(loaded.name, "Bluegrass Fabrication");

        let contacts = repo.list_contacts(&customer.id).await.expect("list contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].email.as_deref(), Some("pat@bluegrassfab.test"));

        pool.close().await;
    }

    #[tokio::test]
    async fn contact_for_missing_customer_reports_absence() {
        let pool = setup_pool().await;
        let repo = SqlCustomerRepository::new(pool.clone());

        let outcome = repo
            .add_contact(&CustomerId("cust-ghost".to_string()), "Nobody", None, None)
            .await
            .expect("add contact call");
        assert!(outcome.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn list_orders_customers_by_name() {
        let pool = setup_pool().await;
        let repo = SqlCustomerRepository::new(pool.clone());
        repo.create("Zenith Industrial", "TN").await.expect("create");
        repo.create("Apex Mechanical", "KY").await.expect("create");

        let customers = repo.list().await.expect("list");
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].name, "Apex Mechanical");

        pool.close().await;
    }
}
