//! Seed script for the LMS backend
//!
//! Populates storage with a default staff user, a demo course with lessons,
//! and a handful of payments so the list endpoints have data to serve.
//! Run: cargo run --bin load_data

use chrono::Utc;
use lms_api::auth::hash_password;
use lms_api::models::{Course, Lesson, Payment, PaymentMethod, User};
use lms_api::storage::Storage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = std::env::var("LMS_DATA_DIR").unwrap_or_else(|_| "lms_data".to_string());
    let storage = Storage::open(&data_dir)?;

    let admin = User {
        username: "admin".to_string(),
        password_hash: hash_password("admin")?,
        is_staff: true,
    };
    let _ = storage.create_user(admin); // Ignore if exists

    let student = User {
        username: "student".to_string(),
        password_hash: hash_password("student")?,
        is_staff: false,
    };
    let _ = storage.create_user(student);

    let course = Course {
        id: storage.next_id()?,
        title: "Rust for Backend Developers".to_string(),
        description: "Ownership, async, and the service stack.".to_string(),
        owner: "admin".to_string(),
    };
    storage.insert_course(&course)?;

    let lesson_titles = [
        ("Ownership and Borrowing", Some("https://video.example/ownership")),
        ("Error Handling", Some("https://video.example/errors")),
        ("Async with Tokio", None),
    ];
    let mut first_lesson_id = None;
    for (title, video_link) in lesson_titles {
        let lesson = Lesson {
            id: storage.next_id()?,
            title: title.to_string(),
            description: format!("{} in practice.", title),
            preview: None,
            video_link: video_link.map(String::from),
            course: Some(course.id),
            owner: "admin".to_string(),
        };
        storage.insert_lesson(&lesson)?;
        first_lesson_id.get_or_insert(lesson.id);
    }

    let methods = [PaymentMethod::Cash, PaymentMethod::Transfer, PaymentMethod::Card];
    for (i, method) in methods.into_iter().enumerate() {
        let payment = Payment {
            id: storage.next_id()?,
            date: Utc::now() - chrono::Duration::days(i as i64),
            paid_course: if i % 2 == 0 { Some(course.id) } else { None },
            paid_lesson: if i % 2 == 1 { first_lesson_id } else { None },
            payment_method: method,
        };
        storage.insert_payment(&payment)?;
    }

    println!("Seeded course {} with {} lessons and {} payments",
        course.id,
        lesson_titles.len(),
        methods.len()
    );
    Ok(())
}
