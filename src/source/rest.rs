//! Remote REST API extractor.
//!
//! Pulls users from a JSONPlaceholder-shaped `/users` endpoint and adapts
//! them into employee rows, cycling through the available users when more
//! records are requested than the API returns. Fields the API does not
//! carry (salary, hire date, ssn) are fabricated the same way the
//! synthetic source fabricates them.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use snafu::prelude::*;
use tracing::info;

use crate::error::{ExtractionError, PayloadSnafu, RequestSnafu};
use crate::record::{Batch, EmployeeRecord};
use crate::source::{DEPARTMENTS, DataSource, POSITIONS, RATINGS};

#[derive(Debug, Deserialize)]
struct ApiUser {
    name: String,
    email: String,
    phone: String,
    address: ApiAddress,
}

#[derive(Debug, Deserialize)]
struct ApiAddress {
    street: String,
    city: String,
    zipcode: String,
}

/// REST API data source.
pub struct RestApiSource {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl RestApiSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn adapt(&self, index: usize, user: &ApiUser) -> EmployeeRecord {
        let mut rng = rand::thread_rng();
        let mut names = user.name.split_whitespace();
        let first_name = names.next().unwrap_or("Unknown").to_string();
        let last_name = names.last().map(str::to_string).unwrap_or_else(|| first_name.clone());

        let manager_id = (index > 0).then(|| {
            let manager = rng.gen_range(1..=(index / 10).max(1));
            format!("API{manager:06}")
        });

        EmployeeRecord {
            employee_id: Some(format!("API{:06}", index + 1)),
            first_name: Some(first_name),
            last_name: Some(last_name),
            email: Some(user.email.clone()),
            phone: Some(user.phone.clone()),
            ssn: Some(format!(
                "{:03}-{:02}-{:04}",
                rng.gen_range(100..1000),
                rng.gen_range(10..100),
                rng.gen_range(1000..10000)
            )),
            department: Some(DEPARTMENTS.choose(&mut rng).unwrap().to_string()),
            position: Some(POSITIONS.choose(&mut rng).unwrap().to_string()),
            salary: Some(rng.gen_range(40_000..150_000) as f64),
            hire_date: Some(Utc::now().date_naive() - Duration::days(rng.gen_range(1..3650))),
            street_address: Some(user.address.street.clone()),
            city: Some(user.address.city.clone()),
            // The API carries no state; approximate it from the zip code
            // the way the upstream feed did.
            state: Some(user.address.zipcode.chars().take(2).collect()),
            zip_code: Some(user.address.zipcode.clone()),
            manager_id,
            performance_rating: Some(RATINGS.choose(&mut rng).unwrap().to_string()),
            data_source: Some(self.name.clone()),
        }
    }
}

#[async_trait]
impl DataSource for RestApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, requested: usize) -> Result<Batch, ExtractionError> {
        info!(source = %self.name, requested, url = %self.base_url, "extracting from API");

        let response = self
            .client
            .get(format!("{}/users", self.base_url))
            .send()
            .await
            .context(RequestSnafu { source_name: self.name.clone() })?
            .error_for_status()
            .context(RequestSnafu { source_name: self.name.clone() })?;

        let users: Vec<ApiUser> = response
            .json()
            .await
            .context(RequestSnafu { source_name: self.name.clone() })?;
        ensure!(
            !users.is_empty(),
            PayloadSnafu {
                source_name: self.name.clone(),
                message: "API returned no users".to_string(),
            }
        );

        let mut batch = Batch::with_all_columns(&self.name);
        for i in 0..requested {
            batch.push(self.adapt(i, &users[i % users.len()]));
        }

        info!(source = %self.name, records = batch.len(), "API extraction complete");
        Ok(batch)
    }
}
