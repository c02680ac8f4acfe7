use crate::error::RegistryError;
use crate::models::ConnectionFormData;

/// Required-field and range checks run before every test and save
pub struct ConnectionValidator;

impl ConnectionValidator {
    /// Validate a form, reporting the first problem found
    pub fn validate(form: &ConnectionFormData) -> Result<(), RegistryError> {
        let file_based = form.db_type.is_file_based();

        if form.name.trim().is_empty() {
            return Err(RegistryError::Validation(
                "Connection name is required".to_string(),
            ));
        }

        if !file_based && form.host.trim().is_empty() {
            return Err(RegistryError::Validation("Host is required".to_string()));
        }

        if form.database.trim().is_empty() {
            return Err(RegistryError::Validation(
                "Database name is required".to_string(),
            ));
        }

        if !file_based {
            if form.username.trim().is_empty() {
                return Err(RegistryError::Validation("Username is required".to_string()));
            }
            if form.password.trim().is_empty() {
                return Err(RegistryError::Validation("Password is required".to_string()));
            }
        }

        // Zero or missing means "default port"
        if let Some(port) = form.port.filter(|p| *p != 0) {
            if !(1..=65535).contains(&port) {
                return Err(RegistryError::Validation(
                    "Port must be between 1 and 65535".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Message of a validation error without the category tag
    pub fn message(err: &RegistryError) -> String {
        match err {
            RegistryError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn postgres_form() -> ConnectionFormData {
        ConnectionFormData {
            name: "Analytics".to_string(),
            db_type: DatabaseType::PostgreSql,
            host: "db.internal".to_string(),
            port: Some(5432),
            database: "analytics".to_string(),
            username: "reader".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        }
    }

    fn message_of(form: &ConnectionFormData) -> String {
        ConnectionValidator::message(&ConnectionValidator::validate(form).unwrap_err())
    }

    #[test]
    fn test_valid_form() {
        assert!(ConnectionValidator::validate(&postgres_form()).is_ok());
    }

    #[test]
    fn test_required_fields() {
        let mut form = postgres_form();
        form.name = "   ".to_string();
        assert_eq!(message_of(&form), "Connection name is required");

        let mut form = postgres_form();
        form.host.clear();
        assert_eq!(message_of(&form), "Host is required");

        let mut form = postgres_form();
        form.database.clear();
        assert_eq!(message_of(&form), "Database name is required");

        let mut form = postgres_form();
        form.username.clear();
        assert_eq!(message_of(&form), "Username is required");

        let mut form = postgres_form();
        form.password.clear();
        assert_eq!(message_of(&form), "Password is required");
    }

    #[test]
    fn test_sqlite_needs_no_host_or_credentials() {
        let form = ConnectionFormData {
            name: "Local".to_string(),
            db_type: DatabaseType::Sqlite,
            database: "/tmp/app.db".to_string(),
            port: Some(0),
            ..Default::default()
        };
        assert!(ConnectionValidator::validate(&form).is_ok());
    }

    #[test]
    fn test_port_range() {
        let mut form = postgres_form();
        form.port = Some(70000);
        assert_eq!(message_of(&form), "Port must be between 1 and 65535");

        form.port = Some(-1);
        assert_eq!(message_of(&form), "Port must be between 1 and 65535");

        form.port = Some(0);
        assert!(ConnectionValidator::validate(&form).is_ok());

        form.port = None;
        assert!(ConnectionValidator::validate(&form).is_ok());
    }

    #[test]
    fn test_validation_error_is_tagged() {
        let mut form = postgres_form();
        form.host.clear();
        let err = ConnectionValidator::validate(&form).unwrap_err();
        assert_eq!(err.to_string(), "VALIDATION:Host is required");
    }
}
