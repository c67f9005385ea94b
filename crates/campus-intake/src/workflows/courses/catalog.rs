use serde::{Deserialize, Serialize};

/// Placeholder shown wherever no batch supplies a concrete value.
pub const TBA: &str = "TBA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub name: String,
    pub title: String,
}

impl Instructor {
    pub fn to_be_announced() -> Self {
        Self {
            name: TBA.to_string(),
            title: "Certified TESDA Trainer".to_string(),
        }
    }

    /// Name if one has actually been assigned.
    pub fn assigned_name(&self) -> Option<&str> {
        Some(self.name.as_str()).filter(|name| !name.is_empty() && *name != TBA)
    }
}

/// Static course record. Schedule fields are filled from the open batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDefinition {
    pub slug: String,
    pub title: String,
    pub short_description: String,
    pub category: String,
    pub duration_weeks: u32,
    pub total_hours: u32,
    pub certification: String,
    pub start_dates: Vec<String>,
    pub enrollment_deadline: Option<String>,
    pub instructor: Instructor,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    courses: Vec<CourseDefinition>,
}

impl Catalog {
    pub fn new(courses: Vec<CourseDefinition>) -> Self {
        Self { courses }
    }

    /// Courses currently offered by the institute.
    pub fn standard() -> Self {
        Self::new(vec![
            CourseDefinition {
                slug: "bookkeeping-nc-iii".to_string(),
                title: "Bookkeeping NC III".to_string(),
                short_description: "Develop foundational bookkeeping skills for recording, posting, and preparing financial reports.".to_string(),
                category: "Business & Finance".to_string(),
                duration_weeks: 6,
                total_hours: 240,
                certification: "TESDA NC III Certified".to_string(),
                start_dates: vec![TBA.to_string()],
                enrollment_deadline: None,
                instructor: Instructor::to_be_announced(),
            },
            CourseDefinition {
                slug: "events-management-nc-iii".to_string(),
                title: "Events Management Services NC III".to_string(),
                short_description: "Coordinate events, functions and conferences in hotels, conference centers, restaurants and resorts.".to_string(),
                category: "Tourism & Hospitality".to_string(),
                duration_weeks: 3,
                total_hours: 108,
                certification: "TESDA NC III Certified".to_string(),
                start_dates: vec![TBA.to_string()],
                enrollment_deadline: None,
                instructor: Instructor::to_be_announced(),
            },
        ])
    }

    pub fn courses(&self) -> &[CourseDefinition] {
        &self.courses
    }

    pub fn by_slug(&self, slug: &str) -> Option<&CourseDefinition> {
        self.courses.iter().find(|course| course.slug == slug)
    }

    pub fn by_title(&self, title: &str) -> Option<&CourseDefinition> {
        self.courses.iter().find(|course| course.title == title)
    }

    /// Distinct categories in alphabetical order.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> =
            self.courses.iter().map(|course| course.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }
}
