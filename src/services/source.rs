// src/services/source.rs

//! Where the listing page comes from.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{AppError, Result};

/// Supplies the raw markup of the free places page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Fetches the listing page over HTTP.
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PageSource for HttpSource {
    /// Anything but `200 OK` is treated as a failed fetch.
    async fn fetch(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AppError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Serves fixed markup; handy for replaying a saved page.
pub struct StaticSource {
    html: String,
}

impl StaticSource {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl PageSource for StaticSource {
    async fn fetch(&self) -> Result<String> {
        Ok(self.html.clone())
    }
}
