//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod user;
pub mod event;
pub mod chat;

// Re-export commonly used models
pub use user::{User, CreateUserRequest, UserEventList};
pub use event::{Event, GeoPoint, CreateEventRequest, Participant, EventRequest, RequestStatus};
pub use chat::{Chat, Message, MessageStatus, ChatParticipant, ChatWithEventDetails};
