//! Step descriptors for the console click-through
//!
//! Selectors are data, not code: the built-in sequence below can be replaced
//! wholesale by a JSON file when the console's markup drifts, without a
//! rebuild. Values may carry `{username}` / `{password}` / `{project}`
//! placeholders resolved against the run configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::browser::Selector;
use crate::ConfigError;

/// A text entry performed before a step's click
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    /// The input field to type into
    pub field: Selector,
    /// The value to type (may be a placeholder)
    pub value: String,
}

/// One find -> (type) -> click -> (wait) unit of browser interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Short name used in logs
    pub name: String,
    /// Element that must become clickable before the step proceeds
    pub find: Selector,
    /// Text entered before clicking, skipped when the value is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StepInput>,
    /// Element to click (often the same as `find`)
    pub click: Selector,
    /// Element expected to appear after the click
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Selector>,
}

impl StepSpec {
    /// Step that waits for and clicks the same element
    pub fn on(name: impl Into<String>, target: Selector) -> Self {
        Self {
            name: name.into(),
            find: target.clone(),
            input: None,
            click: target,
            expect: None,
        }
    }

    /// Set the element expected after the click
    pub fn expect(mut self, selector: Selector) -> Self {
        self.expect = Some(selector);
        self
    }

    /// Set the pre-click text entry
    pub fn input(mut self, field: Selector, value: impl Into<String>) -> Self {
        self.input = Some(StepInput {
            field,
            value: value.into(),
        });
        self
    }

    /// The text entry to perform before the click. An input with an empty
    /// value (e.g. an unresolved optional credential) is skipped.
    pub fn effective_input(&self) -> Option<&StepInput> {
        self.input.as_ref().filter(|input| !input.value.is_empty())
    }
}

/// Values substituted into step placeholders
#[derive(Debug, Clone)]
pub struct StepVars {
    pub username: String,
    pub password: String,
    pub project: String,
}

impl StepVars {
    fn apply(&self, s: &str) -> String {
        s.replace("{username}", &self.username)
            .replace("{password}", &self.password)
            .replace("{project}", &self.project)
    }

    fn apply_selector(&self, selector: &Selector) -> Selector {
        Selector {
            css: self.apply(&selector.css),
            text: selector.text.as_deref().map(|t| self.apply(t)),
        }
    }
}

/// Resolve all placeholders in a step sequence
pub fn resolve_steps(steps: &[StepSpec], vars: &StepVars) -> Vec<StepSpec> {
    steps
        .iter()
        .map(|step| StepSpec {
            name: step.name.clone(),
            find: vars.apply_selector(&step.find),
            input: step.input.as_ref().map(|input| StepInput {
                field: vars.apply_selector(&input.field),
                value: vars.apply(&input.value),
            }),
            click: vars.apply_selector(&step.click),
            expect: step.expect.as_ref().map(|s| vars.apply_selector(s)),
        })
        .collect()
}

/// Load a step sequence from a JSON file
pub fn load_steps(path: &Path) -> Result<Vec<StepSpec>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::StepsFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::StepsFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// The built-in console export sequence, unresolved.
///
/// Selector order mirrors the console's UI flow: IBM Id login, credentials,
/// session search, application, time window, public view, search, display
/// limit, CSV export.
pub fn export_sequence() -> Vec<StepSpec> {
    vec![
        StepSpec::on(
            "log_in_ibm",
            Selector::css(r#"div[class*="login-with-ibmId"]"#),
        )
        .expect(Selector::css("#continue-button")),
        StepSpec::on("enter_username", Selector::css("#continue-button"))
            .input(Selector::css("input#username"), "{username}")
            .expect(Selector::css("#signinbutton")),
        StepSpec::on("enter_password", Selector::css("#signinbutton"))
            .input(Selector::css("input#password"), "{password}")
            .expect(Selector::css(r#"span[ng-click*="searchForResultClick"]"#)),
        StepSpec::on(
            "open_session_search",
            Selector::css(r#"span[ng-click*="searchForResultClick"]"#),
        )
        .expect(Selector::css(r#"th[title*="Session Start Time"]"#)),
        StepSpec::on(
            "open_application_menu",
            Selector::css(r#"div[class*="app-info"]"#),
        )
        .expect(Selector::css(
            r#"a[tabindex="-1"][title*="Project {project}"]"#,
        )),
        StepSpec::on(
            "select_application",
            Selector::css(r#"a[tabindex="-1"][title*="Project {project}"]"#),
        )
        .expect(Selector::css("div.sess-time-menu")),
        StepSpec::on("open_time_menu", Selector::css("div.sess-time-menu")).expect(Selector::css(
            r#"div[ng-if*="!period.template"][translate*="Last 15 minutes"]"#,
        )),
        StepSpec::on(
            "select_last_15_minutes",
            Selector::css(r#"div[ng-if*="!period.template"][translate*="Last 15 minutes"]"#),
        )
        .expect(Selector::css("span.current-viewname.ng-binding")),
        StepSpec::on(
            "open_view_menu",
            Selector::css("span.current-viewname.ng-binding"),
        )
        .expect(Selector::css(
            r#"div[class*="view-title"][ng-click*="showPublicViews()"]"#,
        )),
        StepSpec::on(
            "show_public_views",
            Selector::css(r#"div[class*="view-title"][ng-click*="showPublicViews()"]"#),
        )
        .expect(Selector::with_text(
            r#"li[ng-repeat*="view in publicViews"] > span"#,
            "{project}",
        )),
        StepSpec::on(
            "select_project_view",
            Selector::with_text(r#"li[ng-repeat*="view in publicViews"] > span"#, "{project}"),
        )
        .expect(Selector::css(r#"span[ng-click*="searchForResultClick()"]"#)),
        StepSpec::on(
            "run_search",
            Selector::css(r#"span[ng-click*="searchForResultClick()"]"#),
        )
        .expect(Selector::css(r#"span[ng-click*="setDisplayLimit(2500)"]"#)),
        StepSpec::on(
            "raise_display_limit",
            Selector::css(r#"span[ng-click*="setDisplayLimit(2500)"]"#),
        )
        .expect(Selector::css(
            r#"div.pull-right.template-menu[style*="padding-top:4px"]"#,
        )),
        StepSpec::on(
            "open_export_menu",
            Selector::css(r#"div.pull-right.template-menu[style*="padding-top:4px"]"#),
        )
        .expect(Selector::css(r#"a[ng-click*="downloadCSV()"]"#)),
        StepSpec::on(
            "download_csv",
            Selector::css(r#"a[ng-click*="downloadCSV()"]"#),
        )
        .expect(Selector::css(
            r#"div.pull-right.template-menu[style*="padding-top:4px"]"#,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> StepVars {
        StepVars {
            username: "user@example.com".into(),
            password: "hunter2".into(),
            project: "Harmony".into(),
        }
    }

    #[test]
    fn test_sequence_shape() {
        let steps = export_sequence();
        assert_eq!(steps.len(), 15);
        assert_eq!(steps[0].name, "log_in_ibm");
        assert_eq!(steps.last().unwrap().name, "download_csv");
        // Every step waits for and clicks something
        for step in &steps {
            assert!(!step.find.css.is_empty(), "{} has no find", step.name);
            assert!(!step.click.css.is_empty(), "{} has no click", step.name);
        }
        // Exactly the credential steps carry inputs
        let with_input: Vec<_> = steps
            .iter()
            .filter(|s| s.input.is_some())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(with_input, vec!["enter_username", "enter_password"]);
    }

    #[test]
    fn test_placeholder_resolution() {
        let steps = resolve_steps(&export_sequence(), &vars());

        let username_step = steps.iter().find(|s| s.name == "enter_username").unwrap();
        assert_eq!(
            username_step.input.as_ref().unwrap().value,
            "user@example.com"
        );

        let app_step = steps.iter().find(|s| s.name == "select_application").unwrap();
        assert!(app_step.find.css.contains("Project Harmony"));

        let view_step = steps.iter().find(|s| s.name == "select_project_view").unwrap();
        assert_eq!(view_step.find.text.as_deref(), Some("Harmony"));
    }

    #[test]
    fn test_empty_input_value_is_skipped() {
        let step = StepSpec::on("enter_username", Selector::css("#next"))
            .input(Selector::css("#user"), "{username}");

        let no_username = StepVars {
            username: String::new(),
            ..vars()
        };
        let resolved = resolve_steps(&[step], &no_username);
        assert!(resolved[0].input.is_some());
        assert!(resolved[0].effective_input().is_none());

        let resolved = resolve_steps(&resolved, &vars());
        // The placeholder is gone, so a second resolution changes nothing
        assert!(resolved[0].effective_input().is_none());
    }

    #[test]
    fn test_resolution_leaves_plain_steps_untouched() {
        let raw = export_sequence();
        let resolved = resolve_steps(&raw, &vars());
        assert_eq!(raw[0], resolved[0]);
    }

    #[test]
    fn test_load_steps_from_json() {
        let json = r##"[
            {
                "name": "open_login",
                "find": {"css": "#login"},
                "click": {"css": "#login"},
                "expect": {"css": "#user"}
            },
            {
                "name": "enter_user",
                "find": {"css": "#next"},
                "input": {"field": {"css": "#user"}, "value": "{username}"},
                "click": {"css": "#next"}
            }
        ]"##;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps.json");
        std::fs::write(&path, json).unwrap();

        let steps = load_steps(&path).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "open_login");
        assert!(steps[0].input.is_none());
        assert_eq!(steps[1].input.as_ref().unwrap().value, "{username}");
        assert!(steps[1].expect.is_none());
    }

    #[test]
    fn test_load_steps_missing_file() {
        let err = load_steps(Path::new("/nonexistent/steps.json")).unwrap_err();
        assert!(err.to_string().contains("steps.json"));
    }
}
