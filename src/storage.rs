use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json;
use sled::{Db, Tree};

use crate::models::{Course, CourseSubscription, Lesson, Payment, PaymentMethod, User};

/// Filter for the payments listing (mirrors the query params of the
/// `/payments` endpoint). `None` fields match everything.
#[derive(Debug, Default, Clone)]
pub struct PaymentFilter {
    pub paid_course: Option<u64>,
    pub paid_lesson: Option<u64>,
    pub payment_method: Option<PaymentMethod>,
}

/// Explicit storage handle for the platform, passed into the router state.
/// One Sled tree per entity; values are Serde-JSON encoded. Entity ids come
/// from `Db::generate_id`, so big-endian keys iterate in creation order.
#[allow(dead_code)] // db kept for id generation and future flush/close on Sled
#[derive(Clone)] // Clone for sharing across server/seed binaries (Sled internals cheap to clone)
pub struct Storage {
    db: Db,
    user_tree: Tree,
    course_tree: Tree,
    lesson_tree: Tree,
    payment_tree: Tree,
    subscription_tree: Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let db = sled::open(path)?;
        let user_tree = db.open_tree("users")?;
        let course_tree = db.open_tree("courses")?;
        let lesson_tree = db.open_tree("lessons")?;
        let payment_tree = db.open_tree("payments")?;
        let subscription_tree = db.open_tree("subscriptions")?;
        Ok(Self {
            db,
            user_tree,
            course_tree,
            lesson_tree,
            payment_tree,
            subscription_tree,
        })
    }

    /// Monotonic id for new entities (creation order == id order).
    pub fn next_id(&self) -> Result<u64, Box<dyn std::error::Error>> {
        Ok(self.db.generate_id()?)
    }

    // --- Users (keyed by username; the username is the principal id) ---

    /// Create a user; fails if the username is taken.
    pub fn create_user(&self, user: User) -> Result<(), Box<dyn std::error::Error>> {
        if self.user_tree.contains_key(user.username.as_bytes())? {
            return Err("Username already exists".into());
        }
        let bytes = serde_json::to_vec(&user)?;
        self.user_tree.insert(user.username.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>, Box<dyn std::error::Error>> {
        match self.user_tree.get(username.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // --- Courses ---

    pub fn insert_course(&self, course: &Course) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.course_tree, course.id, course)
    }

    pub fn get_course(&self, id: u64) -> Result<Option<Course>, Box<dyn std::error::Error>> {
        get(&self.course_tree, id)
    }

    /// Upsert; create/update share the encoding.
    pub fn update_course(&self, course: &Course) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.course_tree, course.id, course)
    }

    /// Returns whether a row was actually removed.
    pub fn delete_course(&self, id: u64) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.course_tree.remove(id.to_be_bytes())?.is_some())
    }

    /// All courses in creation order.
    pub fn list_courses(&self) -> Result<Vec<Course>, Box<dyn std::error::Error>> {
        scan(&self.course_tree)
    }

    // --- Lessons ---

    pub fn insert_lesson(&self, lesson: &Lesson) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.lesson_tree, lesson.id, lesson)
    }

    pub fn get_lesson(&self, id: u64) -> Result<Option<Lesson>, Box<dyn std::error::Error>> {
        get(&self.lesson_tree, id)
    }

    pub fn update_lesson(&self, lesson: &Lesson) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.lesson_tree, lesson.id, lesson)
    }

    pub fn delete_lesson(&self, id: u64) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.lesson_tree.remove(id.to_be_bytes())?.is_some())
    }

    pub fn list_lessons(&self) -> Result<Vec<Lesson>, Box<dyn std::error::Error>> {
        scan(&self.lesson_tree)
    }

    // --- Payments ---

    pub fn insert_payment(&self, payment: &Payment) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.payment_tree, payment.id, payment)
    }

    /// Payments matching the filter, in creation order (callers re-sort by
    /// date when an ordering is requested).
    pub fn list_payments(
        &self,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, Box<dyn std::error::Error>> {
        let all: Vec<Payment> = scan(&self.payment_tree)?;
        Ok(all
            .into_iter()
            .filter(|p| filter.paid_course.is_none() || p.paid_course == filter.paid_course)
            .filter(|p| filter.paid_lesson.is_none() || p.paid_lesson == filter.paid_lesson)
            .filter(|p| {
                filter
                    .payment_method
                    .map_or(true, |m| p.payment_method == m)
            })
            .collect())
    }

    // --- Course subscriptions (create/destroy only, never updated) ---

    pub fn insert_subscription(
        &self,
        sub: &CourseSubscription,
    ) -> Result<(), Box<dyn std::error::Error>> {
        put(&self.subscription_tree, sub.id, sub)
    }

    pub fn get_subscription(
        &self,
        id: u64,
    ) -> Result<Option<CourseSubscription>, Box<dyn std::error::Error>> {
        get(&self.subscription_tree, id)
    }

    pub fn delete_subscription(&self, id: u64) -> Result<bool, Box<dyn std::error::Error>> {
        Ok(self.subscription_tree.remove(id.to_be_bytes())?.is_some())
    }

    pub fn list_subscriptions(
        &self,
    ) -> Result<Vec<CourseSubscription>, Box<dyn std::error::Error>> {
        scan(&self.subscription_tree)
    }
}

fn put<T: Serialize>(tree: &Tree, id: u64, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = serde_json::to_vec(value)?;
    tree.insert(id.to_be_bytes(), bytes)?;
    Ok(())
}

fn get<T: DeserializeOwned>(tree: &Tree, id: u64) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match tree.get(id.to_be_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let mut out = Vec::new();
    for item in tree.iter() {
        let (_, v) = item?;
        out.push(serde_json::from_slice(&v)?);
    }
    Ok(out)
}
