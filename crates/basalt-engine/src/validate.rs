use basalt_document::{Document, FieldBuffer, Path, Value};

use crate::catalog::TableInfo;
use crate::error::EngineError;

pub(crate) fn path_value(fb: &FieldBuffer, path: &Path) -> Result<Option<Value>, EngineError> {
    let root = Value::Document(Document::Buf(fb.clone()));
    Ok(path.get_value(&root)?)
}

/// Apply declared defaults, coerce values to their declared types, and
/// enforce NOT NULL, in place. Sequence-backed paths are filled by the
/// caller before this runs.
pub(crate) fn apply_constraints(
    info: &TableInfo,
    fb: &mut FieldBuffer,
) -> Result<(), EngineError> {
    for fc in &info.constraints {
        let mut value = path_value(fb, &fc.path)?;

        if matches!(value, None | Some(Value::Null))
            && let Some(default) = &fc.default_value
        {
            fb.set_path(fc.path.fragments(), default.clone())?;
            value = Some(default.clone());
        }

        if let Some(ty) = fc.ty
            && let Some(v) = &value
            && !v.is_null()
            && v.type_of() != ty
        {
            let got = v.type_of();
            let cast = v.clone().cast_as(ty).map_err(|_| EngineError::TypeMismatch {
                path: fc.path.to_string(),
                expected: ty,
                got,
            })?;
            fb.set_path(fc.path.fragments(), cast.clone())?;
            value = Some(cast);
        }

        if fc.not_null && matches!(value, None | Some(Value::Null)) {
            return Err(EngineError::NotNullViolation(fc.path.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldConstraint;
    use basalt_document::ValueType;

    fn info_with(fc: FieldConstraint) -> TableInfo {
        TableInfo {
            constraints: vec![fc],
            ..Default::default()
        }
    }

    #[test]
    fn default_fills_missing_field() {
        let mut fc = FieldConstraint::new(Path::field("status"));
        fc.default_value = Some(Value::Text("active".into()));
        let info = info_with(fc);

        let mut fb = FieldBuffer::new();
        fb.add("a", Value::Integer(1));
        apply_constraints(&info, &mut fb).unwrap();
        assert_eq!(fb.get("status"), Some(&Value::Text("active".into())));
    }

    #[test]
    fn declared_type_coerces_or_fails() {
        let mut fc = FieldConstraint::new(Path::field("n"));
        fc.ty = Some(ValueType::Integer);
        let info = info_with(fc);

        let mut fb = FieldBuffer::new();
        fb.add("n", Value::Text("42".into()));
        apply_constraints(&info, &mut fb).unwrap();
        assert_eq!(fb.get("n"), Some(&Value::Integer(42)));

        let mut fb = FieldBuffer::new();
        fb.add("n", Value::Text("nope".into()));
        assert!(matches!(
            apply_constraints(&info, &mut fb),
            Err(EngineError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn not_null_rejects_missing_and_null() {
        let mut fc = FieldConstraint::new(Path::field("a"));
        fc.not_null = true;
        let info = info_with(fc);

        let mut fb = FieldBuffer::new();
        assert!(matches!(
            apply_constraints(&info, &mut fb),
            Err(EngineError::NotNullViolation(_))
        ));

        let mut fb = FieldBuffer::new();
        fb.add("a", Value::Null);
        assert!(apply_constraints(&info, &mut fb).is_err());
    }
}
