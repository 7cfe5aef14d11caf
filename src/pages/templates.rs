use askama::Template;
use time::{macros::format_description, OffsetDateTime};

use crate::tasks::repo_types::{Task, TaskStats};

/// Task prepared for display.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created: String,
}

impl From<Task> for TaskView {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description.unwrap_or_default(),
            completed: t.completed,
            created: display_time(t.created_at),
        }
    }
}

pub fn display_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default()
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub username: String,
    pub tasks: Vec<TaskView>,
    /// Add-form state; filled in again when a submission is rejected.
    pub error: String,
    pub title: String,
    pub description: String,
}

#[derive(Template, Default)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: String,
    pub error: String,
    pub notice: String,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub username: String,
    pub email: String,
    pub error: String,
    pub min_password_length: usize,
    pub require_confirmation: bool,
}

#[derive(Template)]
#[template(path = "edit.html")]
pub struct EditTemplate {
    pub username: String,
    pub task: TaskView,
    pub error: String,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub username: String,
    pub email: String,
    pub member_since: String,
    pub stats: TaskStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn task(completed: bool) -> TaskView {
        TaskView::from(Task {
            id: 9,
            owner_id: 1,
            title: "<b>buy</b> milk".into(),
            description: Some("two litres".into()),
            completed,
            created_at: datetime!(2024-05-01 12:30:00 UTC),
            updated_at: datetime!(2024-05-01 12:30:00 UTC),
        })
    }

    #[test]
    fn index_escapes_titles_and_links_actions() {
        let html = IndexTemplate {
            username: "alice".into(),
            tasks: vec![task(true)],
            error: String::new(),
            title: String::new(),
            description: String::new(),
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>buy"));
        assert!(html.contains("buy&#60;/b&#62; milk"));
        assert!(html.contains("/complete/9"));
        assert!(html.contains("/edit/9"));
        assert!(html.contains("/delete/9"));
        assert!(html.contains("class=\"done\""));
        assert!(html.contains("2024-05-01 12:30"));
    }

    #[test]
    fn empty_index_says_so() {
        let html = IndexTemplate {
            username: "alice".into(),
            tasks: vec![],
            error: String::new(),
            title: String::new(),
            description: String::new(),
        }
        .render()
        .unwrap();
        assert!(html.contains("Nothing to do yet."));
    }

    #[test]
    fn rejected_add_keeps_the_typed_values() {
        let html = IndexTemplate {
            username: "alice".into(),
            tasks: vec![],
            error: "Title must be at most 100 characters".into(),
            title: "a very long title".into(),
            description: "notes".into(),
        }
        .render()
        .unwrap();
        assert!(html.contains("Title must be at most 100 characters"));
        assert!(html.contains("value=\"a very long title\""));
        assert!(html.contains(">notes</textarea>"));
    }

    #[test]
    fn register_shows_confirmation_only_when_required() {
        let mut page = RegisterTemplate {
            username: String::new(),
            email: String::new(),
            error: String::new(),
            min_password_length: 1,
            require_confirmation: false,
        };
        assert!(!page.render().unwrap().contains("confirm_password"));
        page.require_confirmation = true;
        page.min_password_length = 6;
        let html = page.render().unwrap();
        assert!(html.contains("confirm_password"));
        assert!(html.contains("minlength=\"6\""));
    }

    #[test]
    fn profile_lists_counts() {
        let html = ProfileTemplate {
            username: "alice".into(),
            email: "a@x.com".into(),
            member_since: "2024-05-01 12:30".into(),
            stats: TaskStats::from_counts(5, 2),
        }
        .render()
        .unwrap();
        assert!(html.contains("<td>5</td>"));
        assert!(html.contains("<td>2</td>"));
        assert!(html.contains("<td>3</td>"));
    }
}
