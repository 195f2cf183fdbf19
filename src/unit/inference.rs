use anyhow::Result;
use tracing::debug;
use url::Url;

use super::sanitizer::NameSanitizer;
use super::types::{TeledataOrganization, Unit};
use super::TARGET_UNIT;
use crate::db::Database;

/// Guesses which college unit a teledata organization should nest under by
/// sniffing through the organization's free-text metadata.
pub struct CollegeUnitInferencer<'a> {
    db: &'a Database,
    sanitizer: &'a NameSanitizer,
}

impl<'a> CollegeUnitInferencer<'a> {
    pub fn new(db: &'a Database, sanitizer: &'a NameSanitizer) -> Self {
        CollegeUnitInferencer { db, sanitizer }
    }

    /// A present comment always takes precedence: the URL is consulted only
    /// when no comment exists, so a comment that matches nothing yields no
    /// hint at all.
    ///
    /// The URL fallback scans colleges in insertion order and the first
    /// domain overlap wins. When several colleges' organizations share
    /// overlapping domains the choice between them is not meaningful; this
    /// is a known limitation carried over from the source data model.
    pub async fn infer_college_unit(
        &self,
        organization: &TeledataOrganization,
    ) -> Result<Option<Unit>> {
        let college_units = self.db.college_units().await?;

        if let Some(comment) = organization
            .secondary_comment
            .as_deref()
            .filter(|comment| !comment.is_empty())
        {
            // Extract a college name from the first line of the comment
            let first_line = comment.split('\n').next().unwrap_or("");
            let stripped = first_line.replace('(', "").replace(')', "");
            let name = self.sanitizer.sanitize(&stripped);

            let matched = college_units.into_iter().find(|c| c.name == name);
            if let Some(college) = &matched {
                debug!(
                    target: TARGET_UNIT,
                    "Comment on {:?} matched college unit {:?}", organization.name, college.name
                );
            }
            return Ok(matched);
        }

        if let Some(org_url) = organization.url.as_deref().filter(|url| !url.is_empty()) {
            // See if the URL looks like a subdomain of a URL already linked
            // to some college
            let domain = parse_domain(org_url);
            if domain.is_empty() {
                return Ok(None);
            }

            for college in college_units {
                for linked in self.db.teledata_organizations_for_unit(college.id).await? {
                    let linked_url = match linked.url.as_deref() {
                        Some(url) if !url.is_empty() => url,
                        _ => continue,
                    };
                    let linked_domain = parse_domain(linked_url);
                    if linked_domain.is_empty() {
                        continue;
                    }
                    if domain.contains(&linked_domain) || linked_domain.contains(&domain) {
                        debug!(
                            target: TARGET_UNIT,
                            "URL domain {:?} on {:?} matched college unit {:?}",
                            domain,
                            organization.name,
                            college.name
                        );
                        return Ok(Some(college));
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Extract the host portion of a URL, stripping a leading "www.". Values
/// without a scheme fall back to everything before the first slash.
fn parse_domain(raw: &str) -> String {
    let host = Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| raw.split('/').next().unwrap_or("").to_string());

    host.trim_start_matches("www.").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn organization(
        name: &str,
        secondary_comment: Option<&str>,
        url: Option<&str>,
    ) -> TeledataOrganization {
        TeledataOrganization {
            id: 0,
            name: name.to_string(),
            secondary_comment: secondary_comment.map(|c| c.to_string()),
            url: url.map(|u| u.to_string()),
            unit_id: None,
        }
    }

    async fn college_fixture(db: &Database, name: &str, raw_name: &str) -> Unit {
        let unit = db.add_unit(name, None).await.unwrap();
        let college_id = db.add_college(raw_name).await.unwrap();
        db.set_college_unit(college_id, Some(unit.id)).await.unwrap();
        unit
    }

    #[test]
    fn test_parse_domain() {
        assert_eq!(parse_domain("https://www.cecs.ucf.edu/academics"), "cecs.ucf.edu");
        assert_eq!(parse_domain("https://sciences.ucf.edu"), "sciences.ucf.edu");
        // Scheme-less values keep everything before the first slash
        assert_eq!(parse_domain("www.cecs.ucf.edu/contact"), "cecs.ucf.edu");
    }

    #[tokio::test]
    async fn test_comment_match() {
        let db = Database::in_memory().await.unwrap();
        let sanitizer = NameSanitizer::default();
        let inferencer = CollegeUnitInferencer::new(&db, &sanitizer);

        let engineering =
            college_fixture(&db, "College of Engineering", "COLLEGE OF ENGINEERING").await;
        college_fixture(&db, "College of Sciences", "COLLEGE OF SCIENCES").await;

        let org = organization(
            "Civil Engineering",
            Some("(COLLEGE OF ENGINEERING)\nBuilding 91"),
            None,
        );
        let inferred = inferencer.infer_college_unit(&org).await.unwrap();
        assert_eq!(inferred, Some(engineering));
    }

    #[tokio::test]
    async fn test_unmatched_comment_blocks_url_fallback() {
        let db = Database::in_memory().await.unwrap();
        let sanitizer = NameSanitizer::default();
        let inferencer = CollegeUnitInferencer::new(&db, &sanitizer);

        let engineering =
            college_fixture(&db, "College of Engineering", "COLLEGE OF ENGINEERING").await;
        let linked_id = db
            .add_teledata_organization(
                "College of Engineering",
                None,
                Some("https://www.cecs.ucf.edu"),
            )
            .await
            .unwrap();
        db.set_teledata_organization_unit(linked_id, Some(engineering.id))
            .await
            .unwrap();

        // The URL would match, but the unmatched comment takes precedence
        let org = organization(
            "Materials Lab",
            Some("Unrelated note"),
            Some("https://cecs.ucf.edu/materials"),
        );
        assert_eq!(inferencer.infer_college_unit(&org).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_url_domain_match() {
        let db = Database::in_memory().await.unwrap();
        let sanitizer = NameSanitizer::default();
        let inferencer = CollegeUnitInferencer::new(&db, &sanitizer);

        let engineering =
            college_fixture(&db, "College of Engineering", "COLLEGE OF ENGINEERING").await;
        college_fixture(&db, "College of Sciences", "COLLEGE OF SCIENCES").await;
        let linked_id = db
            .add_teledata_organization(
                "College of Engineering",
                None,
                Some("https://www.cecs.ucf.edu"),
            )
            .await
            .unwrap();
        db.set_teledata_organization_unit(linked_id, Some(engineering.id))
            .await
            .unwrap();

        let org = organization(
            "Materials Lab",
            None,
            Some("https://cecs.ucf.edu/materials"),
        );
        let inferred = inferencer.infer_college_unit(&org).await.unwrap();
        assert_eq!(inferred, Some(engineering));
    }

    #[tokio::test]
    async fn test_no_metadata_yields_no_hint() {
        let db = Database::in_memory().await.unwrap();
        let sanitizer = NameSanitizer::default();
        let inferencer = CollegeUnitInferencer::new(&db, &sanitizer);

        college_fixture(&db, "College of Sciences", "COLLEGE OF SCIENCES").await;

        let org = organization("Parking Services", None, None);
        assert_eq!(inferencer.infer_college_unit(&org).await.unwrap(), None);
    }
}
