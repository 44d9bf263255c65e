use grid_core::{ErrorInfo, FieldMap, GridError};

/// Renders a command template against a binding.
///
/// Every `%{name}` occurrence is replaced with the bound value's textual
/// form. A reference to a name absent from the binding is an error, since a
/// half-substituted command would otherwise be handed to the scheduler.
pub fn render_command(template: &str, binding: &FieldMap) -> Result<String, GridError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(GridError::Sweep(
                ErrorInfo::new("template-syntax", "unterminated %{ substitution")
                    .with_context("template", template.to_string()),
            ));
        };
        let name = &after[..end];
        match binding.get(name) {
            Some(value) => out.push_str(&value.to_string()),
            None => {
                return Err(GridError::Sweep(
                    ErrorInfo::new("template-field", "template references an unbound field")
                        .with_context("field", name.to_string())
                        .with_context("template", template.to_string()),
                ));
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Returns the binding restricted to fields that participate in dedup.
pub fn dedup_view(binding: &FieldMap, ignore: &std::collections::BTreeSet<String>) -> FieldMap {
    binding
        .iter()
        .filter(|(name, _)| !ignore.contains(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// One-line `{ a:1, b:2 }` rendering of a binding for status output.
pub fn pretty_binding(binding: &FieldMap) -> String {
    let body: Vec<String> = binding
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect();
    format!("{{ {} }}", body.join(", "))
}
