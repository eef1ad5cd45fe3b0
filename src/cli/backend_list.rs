use crate::core::backend::BackendRegistry;
use crate::core::config::Settings;

pub fn list_backends(settings: &Settings) {
    let registry = BackendRegistry::builtin(settings);
    print!("{}", backend_table(&registry, &settings.backend));
}

fn backend_table(registry: &BackendRegistry, default_backend: &str) -> String {
    let mut content = String::from("Backends:\n\n");

    let mut rows: Vec<(String, String, String)> = registry
        .available()
        .into_iter()
        .map(|(key, display_name)| {
            let key = if key == default_backend {
                format!("{key}*")
            } else {
                key.to_string()
            };
            (key, display_name.to_string(), "✅".to_string())
        })
        .collect();
    rows.extend(registry.unavailable().iter().map(|entry| {
        (
            entry.key.clone(),
            entry.display_name.clone(),
            format!("❌ {}", entry.reason),
        )
    }));

    let key_width = rows.iter().map(|row| row.0.len()).max().unwrap_or(0).max(7);
    let name_width = rows
        .iter()
        .map(|row| row.1.chars().count())
        .max()
        .unwrap_or(0)
        .max(12);

    content.push_str(&format!(
        "  {:<key_width$}  {:<name_width$}  Available\n",
        "Backend", "Display Name"
    ));
    for (key, display_name, status) in rows {
        content.push_str(&format!(
            "  {key:<key_width$}  {display_name:<name_width$}  {status}\n"
        ));
    }

    if registry.contains(default_backend) {
        content.push_str("\n* = default backend\n");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{BackendError, RuleBasedBackend, ScriptedBackend};

    #[test]
    fn marks_default_and_explains_unavailable_backends() {
        let mut registry = BackendRegistry::new();
        registry.register("simple", "Simple (scripted)", ScriptedBackend::default());
        registry.register("rules", "Rule-based", RuleBasedBackend::default());
        registry.register_result::<ScriptedBackend>(
            "gemini",
            "Gemini",
            Err(BackendError::MissingCredential {
                variable: "GEMINI_API_KEY",
            }),
        );

        let table = backend_table(&registry, "rules");
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines.iter().any(|line| line.contains("rules*") && line.contains("✅")));
        assert!(lines.iter().any(|line| line.contains("simple ") && line.contains("✅")));
        let gemini = lines
            .iter()
            .find(|line| line.contains("gemini"))
            .unwrap();
        assert!(gemini.contains("❌"));
        assert!(gemini.contains("GEMINI_API_KEY"));
        assert!(table.ends_with("* = default backend\n"));
    }

    #[test]
    fn unknown_default_is_not_marked() {
        let mut registry = BackendRegistry::new();
        registry.register("simple", "Simple (scripted)", ScriptedBackend::default());
        let table = backend_table(&registry, "missing");
        assert!(!table.contains('*'));
    }
}
