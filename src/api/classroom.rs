use super::ClassroomSource;
use crate::models::{
    Course, CourseUser, CourseWorkPage, CourseWorkPayload, CoursesPage, StudentSubmissionPayload,
    StudentsPage, SubmissionsPage, TeachersPage,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::{debug, warn};

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 50;
const MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct ClassroomClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ClassroomClient {
    pub fn new(base_url: impl Into<String>, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120)) // 2 minute timeout
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .context("Access token contains invalid header characters")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("classroom-cells"));
        Ok(headers)
    }

    fn request(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Request> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .headers(self.build_headers()?)
            .query(query)
            .build()
            .context(format!("Failed to build request for {}", path))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let request = self.request(path, query)?;
        let url = request.url().to_string();
        let response = self
            .client
            .execute(request)
            .await
            .context(format!("Failed to send request to {}", url))?;

        let status = response.status();

        // Get the response text for both error and success cases
        let response_text = response.text().await.context("Failed to get response text")?;

        if !status.is_success() {
            anyhow::bail!(
                "API request failed with status {} for URL {}\nResponse body: {}",
                status,
                url,
                response_text
            );
        }

        serde_json::from_str(&response_text).with_context(|| {
            format!(
                "Failed to parse JSON response from {}. Response body (first 500 chars): {}",
                url,
                &response_text.chars().take(500).collect::<String>()
            )
        })
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match self.get(path, query).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(e).with_context(|| {
                        format!("Giving up on {} after {} attempts", path, MAX_RETRIES)
                    });
                }
                Err(e) => {
                    warn!(path, attempt, "Request failed, retrying: {:#}", e);
                    attempt += 1;
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    }

    /// Every page of `path`, with `pageSize`/`pageToken` added to `query`
    async fn get_all_pages<P, T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        split: impl Fn(P) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let (items, exhausted) = collect_pages(
            |page_token| {
                let mut page_query = query.to_vec();
                page_query.push(("pageSize", PAGE_SIZE.to_string()));
                if let Some(token) = page_token {
                    page_query.push(("pageToken", token));
                }
                async move { self.get_with_retry(path, &page_query).await }
            },
            split,
        )
        .await?;

        if !exhausted {
            warn!(path, "Stopped paginating after {} pages", MAX_PAGES);
        }
        Ok(items)
    }

    #[cfg_attr(not(feature = "cli"), allow(dead_code))]
    pub async fn get_course(&self, course_id: &str) -> Result<Course> {
        self.get_with_retry(&format!("/courses/{}", course_id), &[]).await
    }
}

#[async_trait]
impl ClassroomSource for ClassroomClient {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        let courses = self
            .get_all_pages("/courses", &[], |p: CoursesPage| (p.courses, p.next_page_token))
            .await?;
        debug!(count = courses.len(), "Listed courses");
        Ok(courses)
    }

    async fn list_students(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        self.get_all_pages(
            &format!("/courses/{}/students", course_id),
            &[],
            |p: StudentsPage| (p.students, p.next_page_token),
        )
        .await
    }

    async fn list_teachers(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        self.get_all_pages(
            &format!("/courses/{}/teachers", course_id),
            &[],
            |p: TeachersPage| (p.teachers, p.next_page_token),
        )
        .await
    }

    async fn list_course_work(&self, course_id: &str) -> Result<Vec<CourseWorkPayload>> {
        self.get_all_pages(
            &format!("/courses/{}/courseWork", course_id),
            &[],
            |p: CourseWorkPage| (p.course_work, p.next_page_token),
        )
        .await
    }

    async fn list_student_submissions(
        &self,
        course_id: &str,
        user_id: &str,
    ) -> Result<Vec<StudentSubmissionPayload>> {
        // "-" lists submissions across all course work of the course
        self.get_all_pages(
            &format!("/courses/{}/courseWork/-/studentSubmissions", course_id),
            &[("userId", user_id.to_string())],
            |p: SubmissionsPage| (p.student_submissions, p.next_page_token),
        )
        .await
    }
}

/// Drive `fetch_page` from the first page until `nextPageToken` runs out or
/// `MAX_PAGES` pages were read. The flag is false when the cap stopped it.
async fn collect_pages<P, T, F, Fut>(
    mut fetch_page: F,
    split: impl Fn(P) -> (Vec<T>, Option<String>),
) -> Result<(Vec<T>, bool)>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let page = fetch_page(page_token.take()).await?;
        let (batch, next) = split(page);
        items.extend(batch);

        match next.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => return Ok((items, true)),
        }
    }

    Ok((items, false))
}
