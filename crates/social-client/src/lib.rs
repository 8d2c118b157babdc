mod client;
pub mod error;
pub mod models;

pub use client::{HttpSession, HttpSessionFactory};
pub use error::{SocialError, SocialResult};
pub use models::{AccountCredentials, Post, PostBatch};

use async_trait::async_trait;

/// An authenticated session able to read a user's timeline.
#[async_trait]
pub trait SocialSession: Send + Sync {
    /// Fetch up to `count` of the most recent posts of `user_id`.
    async fn get_user_posts(&self, user_id: &str, count: usize) -> SocialResult<Vec<Post>>;

    /// Account name for logging
    fn username(&self) -> &str;
}

/// Turns credentials into a live session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn login(&self, credentials: &AccountCredentials)
        -> SocialResult<Box<dyn SocialSession>>;
}
