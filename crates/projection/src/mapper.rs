use model::{PrimitiveType, TargetFieldDefinition, TargetFieldType, WireField};

use crate::{ProjectionError, UnsupportedFieldType};

/// Records with at most this many fields get all their fields shown in list views.
pub const LIST_FIELD_THRESHOLD: usize = 3;

/// Maps a wire primitive to a content field type.
///
/// The table is closed: `bool`, `string` and the numeric primitives. Anything
/// else is rejected.
pub fn map_type(primitive_type: &PrimitiveType) -> Result<TargetFieldType, UnsupportedFieldType> {
    match primitive_type {
        PrimitiveType::Bool => Ok(TargetFieldType::Boolean),
        PrimitiveType::String => Ok(TargetFieldType::String),
        PrimitiveType::Int | PrimitiveType::Float | PrimitiveType::Double => {
            Ok(TargetFieldType::Number)
        }
        PrimitiveType::Other(_) => Err(UnsupportedFieldType(primitive_type.clone())),
    }
}

/// Builds the target definition of `field` for a record with `total_fields` fields.
pub fn field_definition(
    field: &WireField,
    total_fields: usize,
) -> Result<TargetFieldDefinition, ProjectionError> {
    let field_type =
        map_type(&field.primitive_type).map_err(|source| ProjectionError::UnsupportedField {
            field: field.name.clone(),
            source,
        })?;
    Ok(TargetFieldDefinition {
        name: field.name.clone(),
        field_type,
        is_list_field: total_fields <= LIST_FIELD_THRESHOLD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping_table() {
        assert_eq!(map_type(&PrimitiveType::Bool), Ok(TargetFieldType::Boolean));
        assert_eq!(map_type(&PrimitiveType::String), Ok(TargetFieldType::String));
        assert_eq!(map_type(&PrimitiveType::Int), Ok(TargetFieldType::Number));
        assert_eq!(map_type(&PrimitiveType::Float), Ok(TargetFieldType::Number));
        assert_eq!(map_type(&PrimitiveType::Double), Ok(TargetFieldType::Number));
    }

    #[test]
    fn test_other_types_are_rejected() {
        let other = PrimitiveType::Other("array".into());
        assert_eq!(map_type(&other), Err(UnsupportedFieldType(other.clone())));
    }

    #[test]
    fn test_list_field_heuristic() {
        let field = WireField::new("price", PrimitiveType::Float);
        assert!(field_definition(&field, 1).unwrap().is_list_field);
        assert!(field_definition(&field, 3).unwrap().is_list_field);
        assert!(!field_definition(&field, 4).unwrap().is_list_field);
    }

    #[test]
    fn test_field_definition_names_the_failing_field() {
        let field = WireField::new("tags", PrimitiveType::Other("array".into()));
        let err = field_definition(&field, 1).unwrap_err();
        assert!(matches!(err, ProjectionError::UnsupportedField { ref field, .. } if field == "tags"));
    }
}
